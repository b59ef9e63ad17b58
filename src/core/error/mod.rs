mod err;

use std::{borrow::Cow, convert::Infallible};

#[derive(thiserror::Error)]
pub enum Error {
	// std
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	FromUtf8(#[from] std::string::FromUtf8Error),
	#[error(transparent)]
	TryFromInt(#[from] std::num::TryFromIntError),
	#[error(transparent)]
	Utf8(#[from] std::str::Utf8Error),

	// third-party
	#[error(transparent)]
	Figment(#[from] figment::error::Error),
	#[error(transparent)]
	Http(#[from] http::Error),
	#[error("Join error: {0}")]
	JoinError(#[from] tokio::task::JoinError),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error("Tracing filter error: {0}")]
	TracingFilter(#[from] tracing_subscriber::filter::ParseError),

	// ruma
	#[error(transparent)]
	CanonicalJson(#[from] ruma::CanonicalJsonError),
	#[error(transparent)]
	Mxid(#[from] ruma::IdParseError),
	#[error(transparent)]
	Signatures(#[from] ruma::signatures::Error),

	// maelstrom
	#[error("{0}")]
	AccessDenied(Cow<'static, str>),
	#[error("{0}")]
	BadRequest(Cow<'static, str>),
	#[error("{0}")]
	BadServerResponse(Cow<'static, str>),
	#[error("There was a problem with the '{0}' directive in your configuration: {1}")]
	Config(&'static str, Cow<'static, str>),
	#[error("{0}")]
	Conflict(Cow<'static, str>),
	#[error("{0}")]
	Conform(Cow<'static, str>),
	#[error("{0}")]
	Database(Cow<'static, str>),
	#[error("{0}")]
	Forbidden(Cow<'static, str>),
	#[error("{0}")]
	Interrupted(Cow<'static, str>),
	#[error("{0}")]
	NotFound(Cow<'static, str>),
	#[error("{0}")]
	Timeout(Cow<'static, str>),
	#[error("{0}")]
	Unauthorized(Cow<'static, str>),
	#[error("{0}")]
	Unsupported(Cow<'static, str>),

	// unique / untyped
	#[error("{0}")]
	Err(Cow<'static, str>),
}

impl Error {
	/// Sanitizes public-facing errors that can leak sensitive information.
	pub fn sanitized_message(&self) -> String {
		match self {
			| Self::Database(..) => String::from("Database error occurred."),
			| Self::Io(..) => String::from("I/O error occurred."),
			| _ => self.message(),
		}
	}

	/// Generate the error message string.
	#[inline]
	pub fn message(&self) -> String { format!("{self}") }

	/// The Matrix errcode accompanying the HTTP status of this error.
	pub fn errcode(&self) -> &'static str {
		match self {
			| Self::NotFound(..) => "M_NOT_FOUND",
			| Self::AccessDenied(..) | Self::Forbidden(..) => "M_FORBIDDEN",
			| Self::Unauthorized(..) => "M_UNAUTHORIZED",
			| Self::Unsupported(..) => "M_UNRECOGNIZED",
			| Self::Timeout(..) => "M_LIMIT_EXCEEDED",
			| Self::Json(..) | Self::CanonicalJson(..) => "M_BAD_JSON",
			| Self::BadRequest(..) | Self::Conform(..) | Self::Mxid(..) => "M_INVALID_PARAM",
			| _ => "M_UNKNOWN",
		}
	}

	/// Returns the HTTP error code or closest approximation based on error
	/// variant.
	pub fn status_code(&self) -> http::StatusCode {
		use http::StatusCode;

		match self {
			| Self::NotFound(..) => StatusCode::NOT_FOUND,
			| Self::AccessDenied(..) | Self::Forbidden(..) => StatusCode::FORBIDDEN,
			| Self::Unauthorized(..) | Self::Signatures(..) => StatusCode::UNAUTHORIZED,
			| Self::Conflict(..) => StatusCode::CONFLICT,
			| Self::Unsupported(..) => StatusCode::NOT_IMPLEMENTED,
			| Self::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
			| Self::BadRequest(..)
			| Self::Conform(..)
			| Self::Mxid(..)
			| Self::Json(..)
			| Self::CanonicalJson(..) => StatusCode::BAD_REQUEST,
			| _ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Returns true for "not found" errors. Often used as a special case to
	/// eliminate a contained Option with a Result where Ok(None) is instead
	/// Err(e) if e.is_not_found().
	#[inline]
	pub fn is_not_found(&self) -> bool { self.status_code() == http::StatusCode::NOT_FOUND }
}

impl std::fmt::Debug for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.message())
	}
}

#[allow(clippy::fallible_impl_from)]
impl From<Infallible> for Error {
	#[cold]
	#[inline(never)]
	fn from(_e: Infallible) -> Self {
		panic!("infallible error should never exist");
	}
}
