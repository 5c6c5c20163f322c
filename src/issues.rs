use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Issue, IssueFilter, IssueStatus};
use crate::service::{decode_all, HostelService};
use crate::store::{Document, Fields, Filter, Listener, Subscription};

fn open_issue_filters(filter: &IssueFilter) -> Vec<Filter> {
    let mut filters = vec![Filter::any_of("status", IssueStatus::OPEN.map(IssueStatus::as_str))];
    if let Some(block) = filter.block.as_deref() {
        filters.push(Filter::eq("block", block));
    }
    if filter.urgent_only {
        filters.push(Filter::eq("isUrgent", true));
    }
    filters
}

/// Urgent issues first, then oldest first.
pub fn sort_open_issues(mut issues: Vec<Issue>) -> Vec<Issue> {
    issues.sort_by(|a, b| {
        b.is_urgent
            .cmp(&a.is_urgent)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    issues
}

impl HostelService {
    /// Overwrite an issue's status. Any status may be written, including a
    /// move back from `Resolved`.
    #[instrument(skip(self))]
    pub async fn set_status(&self, issue_id: &str, status: IssueStatus) -> ServiceResult<()> {
        if issue_id.trim().is_empty() {
            return Err(ServiceError::NotFound);
        }
        let mut fields = Fields::new();
        fields.insert("status".into(), Value::from(status.as_str()));
        self.store.update_document(&self.cfg.issues_path(), issue_id, fields).await?;
        metrics::increment_counter!("hostel_issue_status_changes_total", "status" => status.as_str());
        info!(issue_id, status = status.as_str(), "issue status updated");
        Ok(())
    }

    pub async fn get_issue(&self, issue_id: &str) -> ServiceResult<Issue> {
        let doc = self.store.get_by_id(&self.cfg.issues_path(), issue_id).await?;
        Ok(doc.decode()?)
    }

    pub async fn list_open_issues(&self, filter: &IssueFilter) -> ServiceResult<Vec<Issue>> {
        let docs = self.store.query(&self.cfg.issues_path(), &open_issue_filters(filter)).await?;
        Ok(sort_open_issues(decode_all(docs)))
    }

    /// Push the open-issue view to `on_change` now and after every change.
    pub async fn watch_open_issues<F>(&self, filter: &IssueFilter, on_change: F) -> ServiceResult<Subscription>
    where
        F: Fn(Vec<Issue>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(move |docs: Vec<Document>| on_change(sort_open_issues(decode_all(docs))));
        Ok(self.store.subscribe(&self.cfg.issues_path(), open_issue_filters(filter), listener).await?)
    }
}
