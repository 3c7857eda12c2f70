//! Success response envelope
//!
//! Every successful JSON response is wrapped as `{"data": ...}` so clients
//! can branch on the presence of `data` vs `error`.

use serde::Serialize;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
