use std::sync::Arc;

use arc_swap::ArcSwap;

/// A shared value that readers load without locking and writers replace wholesale.
pub type Atomic<T> = Arc<ArcSwap<T>>;

pub fn new<T>(v: T) -> Atomic<T> {
	Arc::new(ArcSwap::from_pointee(v))
}

/// Clone the current value, apply `f` to the copy, and publish it.
///
/// Readers observe either the old or the new value, never a partial update. This does not
/// serialize concurrent writers; callers that need read-modify-write semantics must hold their
/// own lock around the call.
pub fn modify<T: Clone, R>(a: &ArcSwap<T>, f: impl FnOnce(&mut T) -> R) -> R {
	let mut cur = T::clone(&a.load_full());
	let res = f(&mut cur);
	a.store(Arc::new(cur));
	res
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn modify_publishes_copy() {
		let a = new(vec![1, 2]);
		let before = a.load_full();
		let len = modify(&a, |v| {
			v.push(3);
			v.len()
		});
		assert_eq!(len, 3);
		assert_eq!(*before, vec![1, 2]);
		assert_eq!(**a.load(), vec![1, 2, 3]);
	}
}
