pub mod arc;
pub mod durfmt;
pub mod strng;
pub mod telemetry;

pub mod prelude {
	pub use crate::arc::Atomic;
	pub use crate::strng::Strng;
}
