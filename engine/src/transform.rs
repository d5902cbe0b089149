//! XOR file transform.
//!
//! Input is read as little-endian 8-byte words, each XOR-ed with the mask
//! and written back little-endian. A trailing partial word of 1-7 bytes is
//! XOR-ed byte-wise against the mask's most significant bytes and written
//! without padding. Applying the transform twice with the same mask
//! restores the original bytes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use crate::error::EngineError;
use crate::mask::{Mask, MASK_LEN};

const BUF_CAP: usize = 64 * 1024;

/// What a single transform produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Full 8-byte words written
    pub words: u64,
    /// Trailing bytes written after the last full word
    pub tail_bytes: usize,
    /// Input ended before its recorded length, in the word phase or the
    /// tail; whatever was missing, including any partial tail, was not written
    pub truncated: bool,
}

impl TransformStats {
    /// Total bytes written to the output.
    pub fn bytes_written(&self) -> u64 {
        self.words * MASK_LEN as u64 + self.tail_bytes as u64
    }
}

/// Which side of the stream failed.
#[derive(Debug)]
pub(crate) enum StreamFault {
    Read(io::Error),
    Write(io::Error),
}

/// Transform `input` into `output` (created or truncated).
///
/// # Errors
/// `OpenInputFailed`/`OpenOutputFailed` if either file cannot be opened,
/// `ReadError`/`WriteError` for failures mid-stream.
pub fn transform_file(input: &Path, output: &Path, mask: Mask) -> Result<TransformStats, EngineError> {
    let input_file = File::open(input).map_err(|e| EngineError::OpenInputFailed {
        path: input.to_path_buf(),
        source: e,
    })?;

    let len = input_file
        .metadata()
        .map_err(|e| EngineError::ReadError {
            path: input.to_path_buf(),
            source: e,
        })?
        .len();

    let output_file = File::create(output).map_err(|e| EngineError::OpenOutputFailed {
        path: output.to_path_buf(),
        source: e,
    })?;

    let mut reader = BufReader::with_capacity(BUF_CAP, input_file);
    let mut writer = BufWriter::with_capacity(BUF_CAP, output_file);

    transform_stream(&mut reader, &mut writer, len, mask).map_err(|fault| match fault {
        StreamFault::Read(e) => EngineError::ReadError {
            path: input.to_path_buf(),
            source: e,
        },
        StreamFault::Write(e) => EngineError::WriteError {
            path: output.to_path_buf(),
            source: e,
        },
    })
}

/// Transform `len` bytes from `reader` into `writer`.
///
/// `len` is the size recorded before reading. If the reader runs dry early
/// the missing part is dropped silently and `truncated` is set.
pub(crate) fn transform_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    mask: Mask,
) -> Result<TransformStats, StreamFault> {
    let full_words = len / MASK_LEN as u64;
    let remainder = (len % MASK_LEN as u64) as usize;
    let mut stats = TransformStats::default();
    let mut word = [0u8; MASK_LEN];
    let word_mask = mask.word_bytes();

    for _ in 0..full_words {
        match reader.read_exact(&mut word) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                stats.truncated = true;
                return finish(writer, stats);
            }
            Err(e) => return Err(StreamFault::Read(e)),
        }

        // Byte-wise XOR against the LE mask bytes equals the LE word XOR
        for (byte, m) in word.iter_mut().zip(word_mask) {
            *byte ^= m;
        }
        writer.write_all(&word).map_err(StreamFault::Write)?;
        stats.words += 1;
    }

    if remainder > 0 {
        let mut tail = [0u8; MASK_LEN];
        let read = read_up_to(reader, &mut tail[..remainder]).map_err(StreamFault::Read)?;
        if read == remainder {
            for (i, byte) in tail[..remainder].iter_mut().enumerate() {
                *byte ^= mask.tail_byte(i);
            }
            writer
                .write_all(&tail[..remainder])
                .map_err(StreamFault::Write)?;
            stats.tail_bytes = remainder;
        } else {
            stats.truncated = true;
        }
    }

    finish(writer, stats)
}

fn finish<W: Write>(writer: &mut W, stats: TransformStats) -> Result<TransformStats, StreamFault> {
    writer.flush().map_err(StreamFault::Write)?;
    Ok(stats)
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
