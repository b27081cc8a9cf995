pub mod serde_dur {
	use std::time::Duration;

	use relay_core::durfmt;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&durfmt::format(*d))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let raw = String::deserialize(d)?;
		durfmt::parse(&raw).map_err(serde::de::Error::custom)
	}
}
