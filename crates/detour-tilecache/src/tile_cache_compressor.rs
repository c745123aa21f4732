//! Compression of tile payloads
//!
//! The tile cache never interprets the bytes following a layer header; it
//! only asks its compressor to restore them. [`NoopCompressor`] stores the
//! payload as-is, [`Lz4Compressor`] uses the LZ4 block format.

use detour_common::{Error, Result, Status};

/// Compresses and restores tile payloads
pub trait TileCacheCompressor: std::fmt::Debug {
    /// Upper bound of the compressed size of `buffer_size` input bytes
    fn max_compressed_size(&self, buffer_size: usize) -> usize;

    /// Upper bound of the restored size of `compressed_size` input bytes
    fn max_decompressed_size(&self, compressed_size: usize) -> usize;

    /// Compresses `src` into `dst`, returning the number of bytes written
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Restores `src` into `dst`, returning the number of bytes written
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;
}

/// Stores payloads uncompressed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl NoopCompressor {
    fn copy(src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let dst = dst
            .get_mut(..src.len())
            .ok_or(Error::TileCache(Status::BufferTooSmall))?;
        dst.copy_from_slice(src);
        Ok(src.len())
    }
}

impl TileCacheCompressor for NoopCompressor {
    fn max_compressed_size(&self, buffer_size: usize) -> usize {
        buffer_size
    }

    fn max_decompressed_size(&self, compressed_size: usize) -> usize {
        compressed_size
    }

    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        Self::copy(src, dst)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        Self::copy(src, dst)
    }
}

const LZ4_MAX_RATIO: usize = 255;

/// LZ4 block compression
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl TileCacheCompressor for Lz4Compressor {
    fn max_compressed_size(&self, buffer_size: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(buffer_size)
    }

    /// An LZ4 block expands at most 255 times
    fn max_decompressed_size(&self, compressed_size: usize) -> usize {
        compressed_size.saturating_mul(LZ4_MAX_RATIO)
    }

    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        lz4_flex::block::compress_into(src, dst).map_err(|e| {
            log::error!("LZ4 compression failed: {:?}", e);
            Error::TileCache(Status::BufferTooSmall)
        })
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        lz4_flex::block::decompress_into(src, dst).map_err(|e| {
            log::error!("LZ4 decompression failed: {:?}", e);
            Error::TileCache(Status::DataCorrupted)
        })
    }
}
