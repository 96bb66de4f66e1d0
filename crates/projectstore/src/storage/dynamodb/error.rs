//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `RepositoryError` from `projectstore_core::storage`.
//! Throttling, capacity and transport failures map to retryable variants.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;

use projectstore_core::storage::{RecordKey, RepositoryError};

/// Error codes DynamoDB returns for conditions that clear up on their own.
const TRANSIENT_CODES: [&str; 7] = [
    "ThrottlingException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
    "TransactionConflictException",
    "TransactionInProgressException",
];

const RECORD: &str = "Record";

/// Map a GetItem SDK error to RepositoryError.
pub fn map_get_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<GetItemError, R>,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        GetItemError::ResourceNotFoundException(_) => table_not_found(),
        GetItemError::ProvisionedThroughputExceededException(_) => {
            RepositoryError::Transient("Throughput exceeded, please retry".to_string())
        }
        GetItemError::RequestLimitExceeded(_) => {
            RepositoryError::Transient("Request limit exceeded, please retry".to_string())
        }
        GetItemError::InternalServerError(_) => {
            RepositoryError::Transient("DynamoDB internal server error".to_string())
        }
        err => unhandled("GetItem", err),
    }
}

/// Map a PutItem SDK error to RepositoryError.
pub fn map_put_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<PutItemError, R>,
    key: &RecordKey,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        PutItemError::ConditionalCheckFailedException(_) => RepositoryError::AlreadyExists {
            entity_type: RECORD,
            id: key.to_string(),
        },
        PutItemError::ResourceNotFoundException(_) => table_not_found(),
        PutItemError::ItemCollectionSizeLimitExceededException(_) => {
            RepositoryError::QueryFailed("Item collection size limit exceeded".to_string())
        }
        err => unhandled("PutItem", err),
    }
}

/// Map an UpdateItem SDK error to RepositoryError.
pub fn map_update_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<UpdateItemError, R>,
    key: &RecordKey,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        UpdateItemError::ConditionalCheckFailedException(_) => RepositoryError::NotFound {
            entity_type: RECORD,
            id: key.to_string(),
        },
        UpdateItemError::ResourceNotFoundException(_) => table_not_found(),
        UpdateItemError::ItemCollectionSizeLimitExceededException(_) => {
            RepositoryError::QueryFailed("Item collection size limit exceeded".to_string())
        }
        err => unhandled("UpdateItem", err),
    }
}

/// Map a DeleteItem SDK error to RepositoryError.
pub fn map_delete_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DeleteItemError, R>,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        DeleteItemError::ResourceNotFoundException(_) => table_not_found(),
        err => unhandled("DeleteItem", err),
    }
}

/// Map a Query SDK error to RepositoryError.
pub fn map_query_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<QueryError, R>,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        QueryError::ResourceNotFoundException(_) => table_not_found(),
        err => unhandled("Query", err),
    }
}

/// Map a Scan SDK error to RepositoryError.
pub fn map_scan_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<ScanError, R>,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        ScanError::ResourceNotFoundException(_) => table_not_found(),
        err => unhandled("Scan", err),
    }
}

/// Map a TransactWriteItems SDK error to RepositoryError.
///
/// A cancelled transaction whose reasons include a failed condition means
/// one of the records already existed.
pub fn map_transact_write_items_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<TransactWriteItemsError, R>,
) -> RepositoryError {
    if let Some(mapped) = transport_error(&err) {
        return mapped;
    }
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => {
            let codes: Vec<&str> = cancelled
                .cancellation_reasons()
                .iter()
                .filter_map(|reason| reason.code())
                .collect();
            if codes.contains(&"ConditionalCheckFailed") {
                RepositoryError::AlreadyExists {
                    entity_type: RECORD,
                    id: "transaction".to_string(),
                }
            } else {
                RepositoryError::Transient(format!(
                    "Transaction cancelled: {}",
                    codes.join(", ")
                ))
            }
        }
        TransactWriteItemsError::ResourceNotFoundException(_) => table_not_found(),
        err => unhandled("TransactWriteItems", err),
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Failures that happened before DynamoDB produced a service error.
fn transport_error<E, R>(err: &SdkError<E, R>) -> Option<RepositoryError> {
    match err {
        SdkError::TimeoutError(_) => Some(RepositoryError::Transient(
            "DynamoDB request timed out".to_string(),
        )),
        SdkError::DispatchFailure(failure) => Some(RepositoryError::ConnectionFailed(format!(
            "Failed to reach DynamoDB: {:?}",
            failure
        ))),
        SdkError::ResponseError(_) => Some(RepositoryError::Transient(
            "Unreadable response from DynamoDB".to_string(),
        )),
        _ => None,
    }
}

fn table_not_found() -> RepositoryError {
    RepositoryError::QueryFailed("Table not found".to_string())
}

fn unhandled<E: ProvideErrorMetadata + Debug>(operation: &str, err: E) -> RepositoryError {
    classify(operation, err.code(), format!("{:?}", err))
}

fn classify(operation: &str, code: Option<&str>, detail: String) -> RepositoryError {
    match code {
        Some(code) if TRANSIENT_CODES.contains(&code) => {
            RepositoryError::Transient(format!("{} failed with {}, please retry", operation, code))
        }
        _ => RepositoryError::QueryFailed(format!("{} failed: {}", operation, detail)),
    }
}
