use bytes::BytesMut;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum CodecError {
    #[error(transparent)]
    StdIo(#[from] std::io::Error),
    #[error("line exceeds the maximum length of {0} bytes")]
    LineTooLong(usize),
    #[error("record contains an embedded newline")]
    EmbeddedNewline,
    #[error(transparent)]
    SerDe(#[from] serde_json::Error),
}

/// Newline-terminated UTF-8 records.
///
/// Carriage returns preceding the terminator are stripped on decode.
#[derive(Debug)]
pub(crate) struct LineCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl LineCodec {
    pub(crate) fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn map_err(&self, err: LinesCodecError) -> CodecError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => CodecError::LineTooLong(self.max_length),
            LinesCodecError::Io(err) => CodecError::StdIo(err),
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines.decode(src).map_err(|err| self.map_err(err))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines.decode_eof(buf).map_err(|err| self.map_err(err))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref();

        if line.contains('\n') {
            return Err(CodecError::EmbeddedNewline);
        }

        if line.len() > self.max_length {
            return Err(CodecError::LineTooLong(self.max_length));
        }

        self.lines.encode(line, dst).map_err(|err| self.map_err(err))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::io::Builder;
    use tokio_util::codec::FramedRead;

    use super::*;

    #[test]
    fn test_line_encoding_decoding() {
        let mut buffer = BytesMut::new();
        let mut codec = LineCodec::new(64);
        codec.encode("QmFirst", &mut buffer).unwrap();
        codec.encode("QmSecond", &mut buffer).unwrap();

        assert_eq!(&buffer[..], b"QmFirst\nQmSecond\n");

        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("QmFirst"));
        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("QmSecond"));
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_embedded_newline_is_rejected() {
        let mut buffer = BytesMut::new();
        let mut codec = LineCodec::new(64);

        let err = codec.encode("first\nsecond", &mut buffer).unwrap_err();
        assert!(matches!(err, CodecError::EmbeddedNewline));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_line_is_rejected() {
        let mut buffer = BytesMut::from(&b"0123456789abcdef\n"[..]);
        let mut codec = LineCodec::new(8);

        let err = codec.decode(&mut buffer).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong(8)));
    }

    #[tokio::test]
    async fn test_multiple_lines_stream() {
        let mut stream = Builder::new()
            .read(b"QmFirst\r\nQm")
            .read(b"Second\n")
            .read(b"QmTrailing")
            .build();
        let mut framed = FramedRead::new(&mut stream, LineCodec::new(64));

        assert_eq!(framed.next().await.unwrap().unwrap(), "QmFirst");
        assert_eq!(framed.next().await.unwrap().unwrap(), "QmSecond");
        assert_eq!(framed.next().await.unwrap().unwrap(), "QmTrailing");
        assert!(framed.next().await.is_none());
    }
}
