//! Gzip codec backed by `flate2`.
//!
//! Reading uses `MultiGzDecoder`, so files produced by appending (`"a"`
//! mode, or `cat a.gz b.gz`) decode as one continuous stream.

use crate::file_handler::compressed::{Codec, CompressedBackend};
use crate::file_handler::BackendKind;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader};

/// Marker type selecting the gzip codec
#[derive(Debug, Clone, Copy)]
pub struct Gzip;

/// Backend for `.gz` files
pub type GzipBackend = CompressedBackend<Gzip>;

impl Codec for Gzip {
    const KIND: BackendKind = BackendKind::Gzip;

    type Decoder = MultiGzDecoder<BufReader<File>>;
    type Encoder = GzEncoder<File>;

    fn decoder(input: BufReader<File>) -> Self::Decoder {
        MultiGzDecoder::new(input)
    }

    fn encoder(output: File, level: u32) -> Self::Encoder {
        GzEncoder::new(output, Compression::new(level))
    }

    fn finish(encoder: Self::Encoder) -> io::Result<File> {
        encoder.finish()
    }
}
