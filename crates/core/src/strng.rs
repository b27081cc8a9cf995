//! Cheaply cloneable, immutable strings used for identifiers that are copied around a lot
//! (key hashes, model names, format names).

pub use arcstr::{ArcStr as Strng, format, literal};

pub const EMPTY: Strng = literal!("");

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	Strng::from(s.as_ref())
}
