use crate::Error;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Extension for inverting the special "not found" case into an Option.
pub trait NotFound<T> {
	fn optional(self) -> Result<Option<T>>;
}

impl<T> NotFound<T> for Result<T> {
	fn optional(self) -> Result<Option<T>> {
		match self {
			| Ok(val) => Ok(Some(val)),
			| Err(e) if e.is_not_found() => Ok(None),
			| Err(e) => Err(e),
		}
	}
}
