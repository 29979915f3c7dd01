use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// One unit of work: a storefront domain paired with a product id.
///
/// Tasks are generated as the Cartesian product of the domain and product-id
/// lists. Duplicate tasks are tolerated; processing is idempotent through the
/// checkpoint ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductTask {
    pub domain: String,
    pub product_id: String,
}

impl ProductTask {
    pub fn new(domain: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            product_id: product_id.into(),
        }
    }

    /// The catalog URL this task fetches.
    pub fn url(&self) -> String {
        format!(
            "https://{}/catalog/product/view/id/{}",
            self.domain, self.product_id
        )
    }

    /// Deterministic per-item output file name.
    pub fn output_filename(&self) -> String {
        format!("{}_{}.json", self.domain, self.product_id)
    }
}

impl fmt::Display for ProductTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.product_id)
    }
}

/// Outcome recorded in the checkpoint ledger after a task attempt.
///
/// Only `Success` makes a task skippable on resume; `Failed` and `Error`
/// rows stay eligible for retry on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Success,
    Failed,
    Error,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Success => "success",
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Error => "error",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of the retrieval client for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200 with the page body, ready for extraction.
    Page { body: String },
    /// HTTP 404 — an expected terminal outcome, not a failure.
    NotFound,
    /// Every retry attempt was exhausted without a 200/404 resolution.
    FailedAllAttempts,
}

pub(crate) fn epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Diagnostic record for a page that returned 200 but yielded no product data.
pub fn no_data_record(task: &ProductTask, page_title: &str, page_size: usize) -> Value {
    json!({
        "url": task.url(),
        "domain": task.domain,
        "product_id": task.product_id,
        "status": "no_react_data",
        "page_title": page_title,
        "page_size": page_size,
        "timestamp": epoch_seconds(),
    })
}

/// Diagnostic record for a product the storefront does not know (404).
pub fn not_found_record(task: &ProductTask) -> Value {
    json!({
        "url": task.url(),
        "domain": task.domain,
        "product_id": task.product_id,
        "status": "not_found",
        "timestamp": epoch_seconds(),
    })
}

/// Diagnostic record for a task whose fetch attempts were all exhausted.
pub fn failed_record(task: &ProductTask) -> Value {
    json!({
        "url": task.url(),
        "domain": task.domain,
        "product_id": task.product_id,
        "status": "failed_all_attempts",
        "timestamp": epoch_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_url_follows_catalog_layout() {
        let task = ProductTask::new("shop.example.com", "110474");
        assert_eq!(
            task.url(),
            "https://shop.example.com/catalog/product/view/id/110474"
        );
    }

    #[test]
    fn output_filename_joins_domain_and_product() {
        let task = ProductTask::new("shop.example.com", "42");
        assert_eq!(task.output_filename(), "shop.example.com_42.json");
    }

    #[test]
    fn diagnostic_records_carry_status_and_context() {
        let task = ProductTask::new("shop.example.com", "42");

        let not_found = not_found_record(&task);
        assert_eq!(not_found["status"], "not_found");
        assert_eq!(not_found["domain"], "shop.example.com");
        assert!(not_found["timestamp"].is_i64());

        let no_data = no_data_record(&task, "Some Page", 1234);
        assert_eq!(no_data["status"], "no_react_data");
        assert_eq!(no_data["page_title"], "Some Page");
        assert_eq!(no_data["page_size"], 1234);

        let failed = failed_record(&task);
        assert_eq!(failed["status"], "failed_all_attempts");
        assert!(failed.get("page_title").is_none());
    }
}
