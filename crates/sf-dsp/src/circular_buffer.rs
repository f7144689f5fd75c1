//! Multichannel circular buffer with a shadow copy.
//!
//! The buffer allocates twice its rounded-up length per channel and mirrors
//! every write into the second half. Any window of up to `length` consecutive
//! samples is therefore contiguously addressable regardless of the wrap
//! position, which lets delay reads hand out plain slices.

use sf_core::{ConfigError, ConfigResult};
use sf_num::{AlignedMatrix, Scalar, next_aligned_size};

/// Multichannel sample ring.
///
/// The zero-delay read position is defined as one sample behind the write
/// head, i.e. the most recently written sample.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    /// `channels x 2*allocated_length` storage; the upper half of each row is
    /// the shadow copy of the lower half.
    buffer: AlignedMatrix<T>,
    /// Usable ring length in samples.
    length: usize,
    /// Ring length rounded up to the alignment.
    allocated_length: usize,
    write_head: usize,
}

impl<T: Scalar> CircularBuffer<T> {
    pub fn new(channels: usize, length: usize, alignment: usize) -> ConfigResult<Self> {
        if channels == 0 || length == 0 {
            return Err(ConfigError::OutOfRange {
                parameter: "circular_buffer",
                detail: format!("channels={channels}, length={length} must both be nonzero"),
            });
        }
        let allocated_length = next_aligned_size(length, alignment);
        Ok(Self {
            buffer: AlignedMatrix::new(channels, 2 * allocated_length, alignment),
            length,
            allocated_length,
            write_head: 0,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.buffer.rows()
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Write one block of samples per channel and advance the write head.
    pub fn write(&mut self, data: &[&[T]]) -> ConfigResult<()> {
        if data.len() != self.channels() {
            return Err(ConfigError::OutOfRange {
                parameter: "circular_buffer_write",
                detail: format!(
                    "got {} channels, buffer has {}",
                    data.len(),
                    self.channels()
                ),
            });
        }
        let samples = data.first().map_or(0, |c| c.len());
        if samples > self.length {
            return Err(ConfigError::OutOfRange {
                parameter: "circular_buffer_write",
                detail: format!("{samples} samples exceed ring length {}", self.length),
            });
        }
        let write_head = self.write_head;
        for (channel, input) in data.iter().enumerate() {
            let row = self.buffer.row_padded_mut(channel);
            row[write_head..write_head + samples].copy_from_slice(input);
        }
        self.advance_write_head(samples);
        Ok(())
    }

    /// Write one block into a single channel without advancing the head.
    ///
    /// Use together with [`commit_write`](Self::commit_write) when channels
    /// are produced one at a time.
    pub fn write_channel(&mut self, channel: usize, input: &[T]) {
        let write_head = self.write_head;
        let row = self.buffer.row_padded_mut(channel);
        row[write_head..write_head + input.len()].copy_from_slice(input);
    }

    /// Advance the write head after per-channel writes.
    pub fn commit_write(&mut self, samples: usize) -> ConfigResult<()> {
        if samples >= self.length {
            return Err(ConfigError::OutOfRange {
                parameter: "circular_buffer_commit",
                detail: format!("{samples} samples exceed ring length {}", self.length),
            });
        }
        self.advance_write_head(samples);
        Ok(())
    }

    /// Mirror the freshly written region into the shadow half and move the
    /// head, wrapping at the allocated length.
    fn advance_write_head(&mut self, samples: usize) {
        let alloc = self.allocated_length;
        let start = self.write_head;
        let first_end = (start + samples).min(alloc);
        let first_len = first_end - start;
        let wrapped = samples - first_len;
        for channel in 0..self.channels() {
            let row = self.buffer.row_padded_mut(channel);
            let (primary, shadow) = row.split_at_mut(alloc);
            shadow[start..start + first_len].copy_from_slice(&primary[start..start + first_len]);
            if wrapped > 0 {
                // The write ran past the end of the primary region; those
                // samples landed at the start of the shadow half and must
                // also appear at the start of the primary half.
                primary[..wrapped].copy_from_slice(&shadow[..wrapped]);
            }
        }
        self.write_head = (start + samples) % alloc;
    }

    /// Read `samples` contiguous values of one channel, ending `delay`
    /// samples behind the most recent sample.
    ///
    /// `delay + samples` must not exceed the ring length; the returned slice
    /// is always contiguous thanks to the shadow copy.
    pub fn read(&self, channel: usize, delay: usize, samples: usize) -> ConfigResult<&[T]> {
        if delay >= self.length || samples > self.length - delay {
            return Err(ConfigError::OutOfRange {
                parameter: "circular_buffer_read",
                detail: format!(
                    "delay {delay} + window {samples} exceeds ring length {}",
                    self.length
                ),
            });
        }
        let row = self.buffer.row_padded(channel);
        // Newest sample lives one behind the write head; address it through
        // the shadow region so the subtraction cannot underflow.
        let newest = self.allocated_length + self.write_head - 1;
        let end = newest - delay + 1;
        Ok(&row[end - samples..end])
    }

    /// Like [`read`](Self::read), but addressed relative to the start of the
    /// block that is about to be (or was just) written: delay 0 with
    /// `offset = blocksize` yields the block itself.
    pub fn read_block_relative(
        &self,
        channel: usize,
        block_size: usize,
        delay: usize,
    ) -> ConfigResult<&[T]> {
        self.read(channel, delay, block_size)
    }

    /// Single delayed sample of one channel.
    #[inline]
    pub fn sample(&self, channel: usize, delay: usize) -> T {
        let row = self.buffer.row_padded(channel);
        let newest = self.allocated_length + self.write_head - 1;
        row[newest - delay]
    }

    /// Window of `taps` samples ending `delay` samples in the past, newest
    /// last. Used by the fractional-delay interpolators.
    #[inline]
    pub fn tap_window(&self, channel: usize, delay: usize, taps: usize) -> &[T] {
        let row = self.buffer.row_padded(channel);
        let newest = self.allocated_length + self.write_head - 1;
        let end = newest - delay + 1;
        &row[end - taps..end]
    }
}
