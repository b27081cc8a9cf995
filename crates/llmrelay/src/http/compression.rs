use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZlibDecoder};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("unsupported content encoding {0:?}")]
	UnsupportedEncoding(Strng),
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
	Identity,
	Gzip,
	Deflate,
	Brotli,
}

impl Encoding {
	/// Parse a `content-encoding` header. Stacked encodings are not supported.
	pub fn from_header(value: Option<&str>) -> Result<Encoding, Error> {
		let Some(value) = value.map(|v| v.trim().to_ascii_lowercase()) else {
			return Ok(Encoding::Identity);
		};
		match value.as_str() {
			"" | "identity" => Ok(Encoding::Identity),
			"gzip" | "x-gzip" => Ok(Encoding::Gzip),
			"deflate" => Ok(Encoding::Deflate),
			"br" => Ok(Encoding::Brotli),
			_ => Err(Error::UnsupportedEncoding(strng::new(value))),
		}
	}
}

pub async fn decode(body: Bytes, encoding: Encoding) -> Result<Bytes, Error> {
	match encoding {
		Encoding::Identity => Ok(body),
		Encoding::Gzip => read_all(GzipDecoder::new(body.as_ref())).await,
		// HTTP "deflate" is zlib wrapped
		Encoding::Deflate => read_all(ZlibDecoder::new(body.as_ref())).await,
		Encoding::Brotli => read_all(BrotliDecoder::new(body.as_ref())).await,
	}
}

async fn read_all(mut r: impl AsyncRead + Unpin) -> Result<Bytes, Error> {
	let mut out = Vec::new();
	r.read_to_end(&mut out).await?;
	Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
	use async_compression::tokio::bufread::{BrotliEncoder, GzipEncoder, ZlibEncoder};

	use super::*;

	async fn encode(body: &[u8], encoding: Encoding) -> Bytes {
		match encoding {
			Encoding::Identity => Bytes::copy_from_slice(body),
			Encoding::Gzip => read_all(GzipEncoder::new(body)).await.unwrap(),
			Encoding::Deflate => read_all(ZlibEncoder::new(body)).await.unwrap(),
			Encoding::Brotli => read_all(BrotliEncoder::new(body)).await.unwrap(),
		}
	}

	#[tokio::test]
	async fn decodes_supported_encodings() {
		let body = br#"{"hello":"world"}"#;
		for enc in [
			Encoding::Identity,
			Encoding::Gzip,
			Encoding::Deflate,
			Encoding::Brotli,
		] {
			let encoded = encode(body, enc).await;
			assert_eq!(decode(encoded, enc).await.unwrap().as_ref(), body, "{enc:?}");
		}
	}

	#[test]
	fn parses_header() {
		assert_eq!(Encoding::from_header(None).unwrap(), Encoding::Identity);
		assert_eq!(Encoding::from_header(Some(" GZIP ")).unwrap(), Encoding::Gzip);
		assert_eq!(Encoding::from_header(Some("br")).unwrap(), Encoding::Brotli);
		assert!(matches!(
			Encoding::from_header(Some("zstd")),
			Err(Error::UnsupportedEncoding(e)) if e == "zstd"
		));
		assert!(Encoding::from_header(Some("gzip, br")).is_err());
	}

	#[tokio::test]
	async fn corrupt_body_is_an_error() {
		let err = decode(Bytes::from_static(b"not gzip"), Encoding::Gzip).await;
		assert!(matches!(err, Err(Error::Io(_))));
	}
}
