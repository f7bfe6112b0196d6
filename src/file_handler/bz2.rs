//! Bzip2 codec backed by the `bzip2` crate.

use crate::file_handler::compressed::{Codec, CompressedBackend};
use crate::file_handler::BackendKind;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::fs::File;
use std::io::{self, BufReader};

/// Marker type selecting the bzip2 codec
#[derive(Debug, Clone, Copy)]
pub struct Bzip2;

/// Backend for `.bz2` files
pub type Bzip2Backend = CompressedBackend<Bzip2>;

impl Codec for Bzip2 {
    const KIND: BackendKind = BackendKind::Bzip2;

    type Decoder = MultiBzDecoder<BufReader<File>>;
    type Encoder = BzEncoder<File>;

    fn decoder(input: BufReader<File>) -> Self::Decoder {
        MultiBzDecoder::new(input)
    }

    fn encoder(output: File, level: u32) -> Self::Encoder {
        BzEncoder::new(output, Compression::new(level))
    }

    fn finish(encoder: Self::Encoder) -> io::Result<File> {
        encoder.finish()
    }
}
