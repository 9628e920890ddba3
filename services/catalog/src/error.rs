use crate::context::Interrupted;
use crate::image_store::ImageStoreError;
use crate::laptop_store::StoreError;
use thiserror::Error;

/// Terminal outcome of a failed catalog call.
///
/// Each variant corresponds to one status a transport reports to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request is canceled")]
    Canceled,

    #[error("deadline is exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<Interrupted> for CatalogError {
    fn from(e: Interrupted) -> Self {
        match e {
            Interrupted::Canceled => CatalogError::Canceled,
            Interrupted::DeadlineExceeded => CatalogError::DeadlineExceeded,
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(id) => {
                CatalogError::AlreadyExists(format!("laptop {} already exists", id))
            }
            StoreError::Interrupted(i) => i.into(),
            other => CatalogError::Internal(other.to_string()),
        }
    }
}

impl From<ImageStoreError> for CatalogError {
    fn from(e: ImageStoreError) -> Self {
        CatalogError::Internal(format!("cannot save image to the store: {}", e))
    }
}

impl From<CatalogError> for tonic::Status {
    fn from(e: CatalogError) -> Self {
        let message = e.to_string();
        match e {
            CatalogError::InvalidArgument(_) => tonic::Status::invalid_argument(message),
            CatalogError::AlreadyExists(_) => tonic::Status::already_exists(message),
            CatalogError::NotFound(_) => tonic::Status::not_found(message),
            CatalogError::Canceled => tonic::Status::cancelled(message),
            CatalogError::DeadlineExceeded => tonic::Status::deadline_exceeded(message),
            CatalogError::Internal(_) => tonic::Status::internal(message),
            CatalogError::Unknown(_) => tonic::Status::unknown(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            CatalogError::from(StoreError::AlreadyExists("x".into())),
            CatalogError::AlreadyExists(_)
        ));
        assert_eq!(
            CatalogError::from(StoreError::Interrupted(Interrupted::Canceled)),
            CatalogError::Canceled
        );
        assert_eq!(
            CatalogError::from(StoreError::Interrupted(Interrupted::DeadlineExceeded)),
            CatalogError::DeadlineExceeded
        );
        assert!(matches!(
            CatalogError::from(StoreError::Poisoned),
            CatalogError::Internal(_)
        ));
        assert!(matches!(
            CatalogError::from(StoreError::Emit("closed".into())),
            CatalogError::Internal(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (CatalogError::InvalidArgument("x".into()), Code::InvalidArgument),
            (CatalogError::AlreadyExists("x".into()), Code::AlreadyExists),
            (CatalogError::NotFound("x".into()), Code::NotFound),
            (CatalogError::Canceled, Code::Cancelled),
            (CatalogError::DeadlineExceeded, Code::DeadlineExceeded),
            (CatalogError::Internal("x".into()), Code::Internal),
            (CatalogError::Unknown("x".into()), Code::Unknown),
        ];

        for (error, code) in cases {
            assert_eq!(tonic::Status::from(error).code(), code);
        }
    }
}
