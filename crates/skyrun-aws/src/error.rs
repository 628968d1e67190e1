//! SDK error classification.
//!
//! Maps `SdkError` values onto the domain error taxonomy: throttle and
//! timeout classes become transient provider errors, missing-resource
//! codes become `NotFound`, and everything else is a permanent provider
//! error carrying the full error chain.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use skyrun_types::Error;

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "RequestTimeout",
    "SlowDown",
];

const NOT_FOUND_CODES: &[&str] = &["NoSuchBucket", "NoSuchKey", "NoSuchEntity"];

const ALREADY_EXISTS_CODES: &[&str] = &[
    "BucketAlreadyOwnedByYou",
    "EntityAlreadyExists",
    "RepositoryAlreadyExistsException",
    "ResourceAlreadyExistsException",
    "ResourceConflictException",
];

/// Convert an SDK failure into a domain error, prefixed with `context`.
pub(crate) fn map_sdk_err<E, R>(err: SdkError<E, R>, context: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.as_service_error().and_then(ProvideErrorMetadata::code);
    if code.is_some_and(is_not_found_code) {
        return Error::NotFound(format!("{context}: {}", DisplayErrorContext(&err)));
    }
    let transient = code.is_some_and(is_transient_code)
        || matches!(&err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_));
    Error::Provider {
        message: format!("{context}: {}", DisplayErrorContext(&err)),
        transient,
    }
}

/// True when the failure means the resource is already there, which the
/// idempotent `ensure_*` operations treat as success.
pub(crate) fn is_already_exists<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    err.as_service_error()
        .and_then(ProvideErrorMetadata::code)
        .is_some_and(|code| ALREADY_EXISTS_CODES.contains(&code))
}

/// True when the failure means the resource does not exist.
pub(crate) fn is_missing<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    err.as_service_error()
        .and_then(ProvideErrorMetadata::code)
        .is_some_and(is_not_found_code)
}

fn is_transient_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

fn is_not_found_code(code: &str) -> bool {
    NOT_FOUND_CODES.contains(&code) || code.contains("NotFound")
}
