//! Error construction macros. `err!` yields an `Error` value, `Err!` the
//! matching `Result`. The variant name is written first, followed by a
//! format string and arguments:
//!
//! ```ignore
//! return Err!(NotFound("event {event_id} is not indexed"));
//! ```

#[macro_export]
macro_rules! err {
	(Config($item:literal, $($args:tt)+)) => {
		$crate::Error::Config($item, ::std::format!($($args)+).into())
	};

	($variant:ident ( $($args:tt)+ )) => {
		$crate::Error::$variant(::std::format!($($args)+).into())
	};

	($($args:tt)+) => {
		$crate::Error::Err(::std::format!($($args)+).into())
	};
}

#[macro_export]
macro_rules! Err {
	($($args:tt)+) => {
		::std::result::Result::Err($crate::err!($($args)+))
	};
}
