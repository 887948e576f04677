//! Response envelope and pagination for callers that expose the model
//! over a wire.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default page size when a caller asks for zero.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a caller can request.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Machine-readable error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Stable code, see [`CoreError::code`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the caller may retry.
    pub retryable: bool,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Success or error wrapper with a uniform shape.
///
/// ```json
/// { "success": true, "data": { ... } }
/// { "success": false, "error": { "code": "NOT_FOUND", "message": "...", "retryable": false } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// The result, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// The failure, otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    /// Wrap a successful result.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Wrap a failure.
    pub fn err(err: &CoreError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.into()),
        }
    }
}

impl<T> From<Result<T, CoreError>> for Envelope<T> {
    fn from(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::err(&err),
        }
    }
}

/// One page of a larger result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number actually served.
    pub page: usize,
    /// Page size actually used.
    pub page_size: usize,
    /// Items across all pages.
    pub total: usize,
    /// Number of pages (0 when there are no items).
    pub total_pages: usize,
}

/// Cut `items` into pages and return page `page` (1-based).
///
/// Page 0 is treated as page 1. A page size of 0 falls back to
/// [`DEFAULT_PAGE_SIZE`], and sizes above [`MAX_PAGE_SIZE`] are clamped.
/// A page past the end comes back empty with the totals filled in.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = match page_size {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    let total = items.len();
    let total_pages = total.div_ceil(page_size);
    let skip = page.saturating_sub(1).saturating_mul(page_size);

    Page {
        items: items.into_iter().skip(skip).take(page_size).collect(),
        page,
        page_size,
        total,
        total_pages,
    }
}
