use crate::ir::{InstructionStream, Number, Token};
#[cfg(not(target_arch = "wasm32"))]
use memmap::Mmap;
#[cfg(not(target_arch = "wasm32"))]
use std::fs::File;
use std::io;
use std::ops::Deref;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

const COMMENT: u8 = b'#';
const SEPARATORS: [u8; 8] = [b' ', b'\t', b'\n', b'\r', b',', b'[', b']', b';'];
const QUOTES: [u8; 2] = [b'\'', b'"'];

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("failed to open file, details: {0}")]
    FileOpen(#[source] io::Error),
    #[error("failed to memory map file, details: {0}")]
    MemoryMap(#[source] io::Error),
    #[error("token at position {position} is not valid utf-8")]
    InvalidUtf8 { position: usize },
}

#[derive(Debug)]
enum Source {
    #[cfg(not(target_arch = "wasm32"))]
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            #[cfg(not(target_arch = "wasm32"))]
            Source::Mapped(map) => &map[..],
            Source::Owned(bytes) => &bytes[..],
        }
    }
}

/// Splits a flat listing of tokens into an instruction stream. Tokens are separated by
/// whitespace, commas, semicolons or brackets and may be quoted, so both `PUSH 3 PUSH 4 ADD`
/// and `['PUSH', 3, 'PUSH', 4, 'ADD']` load to the same stream. `#` starts a comment that runs
/// to the end of the line.
///
/// Every word becomes exactly one token; whether the tokens form a valid program is only
/// decided when the stream is executed.
#[derive(Debug)]
pub struct Listing {
    source: Source,
    token_index: usize,
}

impl Listing {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn open(file_name: impl AsRef<Path>) -> Result<Listing, ListingError> {
        let file = File::open(file_name.as_ref()).map_err(ListingError::FileOpen)?;
        let len = file.metadata().map_err(ListingError::FileOpen)?.len();
        // zero-length files cannot be mapped
        let source = if len == 0 {
            Source::Owned(vec![])
        } else {
            let map = unsafe { Mmap::map(&file) }.map_err(ListingError::MemoryMap)?;
            Source::Mapped(map)
        };
        debug!(file = %file_name.as_ref().display(), bytes = len, "listing loaded");

        Ok(Listing {
            source,
            token_index: 0,
        })
    }

    pub fn from_source(source: &str) -> Listing {
        Listing {
            source: Source::Owned(source.as_bytes().to_vec()),
            token_index: 0,
        }
    }

    /// Collects every token of the listing
    pub fn into_stream(mut self) -> Result<InstructionStream, ListingError> {
        let stream = (&mut self).collect::<Result<InstructionStream, _>>()?;
        debug!(tokens = stream.len(), "listing tokenized");

        Ok(stream)
    }

    fn next_word(&mut self) -> Option<(usize, usize)> {
        let source = &self.source;
        let mut index = self.token_index;
        while index < source.len() {
            let byte = source[index];
            if byte == COMMENT {
                while index < source.len() && source[index] != b'\n' {
                    index += 1;
                }
            } else if SEPARATORS.contains(&byte) || QUOTES.contains(&byte) {
                index += 1;
            } else {
                break;
            }
        }
        if index >= source.len() {
            self.token_index = index;
            return None;
        }

        let start = index;
        while index < source.len()
            && !SEPARATORS.contains(&source[index])
            && !QUOTES.contains(&source[index])
            && source[index] != COMMENT
        {
            index += 1;
        }
        self.token_index = index;

        Some((start, index))
    }

    fn token(&self, start: usize, end: usize) -> Result<Token, ListingError> {
        let word = std::str::from_utf8(&self.source[start..end])
            .map_err(|_| ListingError::InvalidUtf8 { position: start })?;
        // words that are not integers, `3x` or `1.5` included, stay tags for the engine to reject
        match word.parse::<Number>() {
            Ok(value) => Ok(Token::Literal(value)),
            Err(_) => Ok(Token::tag(word)),
        }
    }
}

impl Iterator for &mut Listing {
    type Item = Result<Token, ListingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, end) = self.next_word()?;
        Some(self.token(start, end))
    }
}

impl FromStr for InstructionStream {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Listing::from_source(s).into_stream()
    }
}
