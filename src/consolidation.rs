//! Merging of duplicate maintenance reports.
//!
//! Reports for the same block, floor and category share a consolidation key.
//! While an issue with that key is open, further reports only add their room
//! to its reporter list. The decision is made in two phases:
//!
//! 1. an advisory, non-transactional query names a candidate issue;
//! 2. a store transaction re-reads that candidate by id, together with the
//!    key's claim document, and either appends the reporter or creates the
//!    issue plus its claim.
//!
//! Every creation rewrites the claim, and every decision reads it, so two
//! submitters that both see "no open issue" conflict at commit time and the
//! loser is re-run by [`run_transaction`], this time merging into the winner.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::config::HostelConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{ConsolidationOutcome, Issue, IssueStatus, NewReport, Reporter};
use crate::service::{non_blank, HostelService};
use crate::store::{run_transaction, server_timestamp, to_fields, Fields, Filter, StoreResult, Transaction, TransactionBody};

/// `"{block}_{floor}_{CATEGORY}"`, whitespace in the category replaced by `_`.
pub fn consolidation_key(block: &str, floor: u8, category: &str) -> String {
    let category: String = category
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{block}_{floor}_{}", category.to_uppercase())
}

#[derive(Debug, Clone)]
struct ValidReport {
    block: String,
    floor: u8,
    category: String,
    description: String,
    is_urgent: bool,
    room: String,
    user_id: String,
}

fn required(value: Option<&str>, field: &str) -> ServiceResult<String> {
    non_blank(value)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Validation(format!("{field} is required")))
}

fn validate_report(cfg: &HostelConfig, report: &NewReport) -> ServiceResult<ValidReport> {
    let block = required(report.block.as_deref(), "block")?;
    let floor = report.floor.ok_or_else(|| ServiceError::Validation("floor is required".into()))?;
    let category = required(report.category.as_deref(), "category")?;
    let description = required(report.description.as_deref(), "description")?;
    let room = required(report.reporter_room.as_deref(), "reporter room")?;
    let user_id = required(report.reporter_user_id.as_deref(), "reporter user id")?;

    if !cfg.has_block(&block) {
        return Err(ServiceError::Validation(format!("unknown block '{block}'")));
    }
    if !cfg.has_floor(floor) {
        return Err(ServiceError::Validation(format!("unknown floor {floor}")));
    }
    if !cfg.has_category(&category) {
        return Err(ServiceError::Validation(format!("unknown category '{category}'")));
    }
    Ok(ValidReport { block, floor, category, description, is_urgent: report.is_urgent, room, user_id })
}

struct ConsolidateReport<'a> {
    report: &'a ValidReport,
    key: &'a str,
    issues_path: &'a str,
    claims_path: &'a str,
    claim_id: String,
    advisory: Option<String>,
    new_issue_id: String,
}

impl<'a> ConsolidateReport<'a> {
    fn merge(&self, tx: &mut dyn Transaction, issue: Issue) -> StoreResult<ConsolidationOutcome> {
        if issue.reported_by_room(&self.report.room) {
            return Ok(ConsolidationOutcome::AlreadyReported { issue_id: issue.id });
        }
        let mut reporters = issue.reporters;
        reporters.push(Reporter { room: self.report.room.clone(), user_id: self.report.user_id.clone() });
        let reporter_count = reporters.len();
        let mut fields = Fields::new();
        fields.insert("reporters".into(), serde_json::to_value(&reporters)?);
        tx.update(self.issues_path, &issue.id, fields);
        Ok(ConsolidationOutcome::Consolidated { issue_id: issue.id, reporter_count })
    }

    fn create(&self, tx: &mut dyn Transaction) -> ConsolidationOutcome {
        let r = self.report;
        tx.set(
            self.issues_path,
            &self.new_issue_id,
            to_fields(json!({
                "block": r.block,
                "floor": r.floor,
                "category": r.category,
                "description": r.description,
                "isUrgent": r.is_urgent,
                "status": IssueStatus::New.as_str(),
                "consolidationKey": self.key,
                "createdAt": server_timestamp(),
                "reporters": [{ "room": r.room, "userId": r.user_id }],
            })),
        );
        tx.set(
            self.claims_path,
            &self.claim_id,
            to_fields(json!({ "issueId": self.new_issue_id, "consolidationKey": self.key })),
        );
        ConsolidationOutcome::Created { issue_id: self.new_issue_id.clone() }
    }
}

#[async_trait]
impl<'a> TransactionBody for ConsolidateReport<'a> {
    type Output = ConsolidationOutcome;

    async fn run(&self, tx: &mut dyn Transaction) -> StoreResult<ConsolidationOutcome> {
        let claimed = tx
            .get(self.claims_path, &self.claim_id)
            .await?
            .and_then(|doc| doc.data.get("issueId").and_then(Value::as_str).map(str::to_string));

        let mut candidates: Vec<String> = self.advisory.iter().cloned().collect();
        if let Some(id) = claimed {
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }

        for id in &candidates {
            // the advisory answer may be stale: only the in-transaction read decides
            let Some(doc) = tx.get(self.issues_path, id).await? else { continue };
            let issue: Issue = match doc.decode() {
                Ok(issue) => issue,
                Err(e) => {
                    warn!(issue_id = %id, error = %e, "ignoring malformed candidate issue");
                    continue;
                }
            };
            if issue.status.is_open() && issue.consolidation_key == self.key {
                return self.merge(tx, issue);
            }
        }
        Ok(self.create(tx))
    }
}

impl HostelService {
    /// Merge `report` into the open issue for its location and category, or
    /// open a new one. Concurrent calls for the same key never leave two open
    /// issues and never lose a distinct room.
    #[instrument(skip(self, report), fields(key = tracing::field::Empty))]
    pub async fn submit_report(&self, report: NewReport) -> ServiceResult<ConsolidationOutcome> {
        let report = validate_report(&self.cfg, &report)?;
        let key = consolidation_key(&report.block, report.floor, &report.category);
        tracing::Span::current().record("key", key.as_str());

        let issues_path = self.cfg.issues_path();
        let claims_path = self.cfg.claims_path();

        let advisory = self
            .store
            .query(
                &issues_path,
                &[
                    Filter::eq("consolidationKey", key.as_str()),
                    Filter::any_of("status", IssueStatus::OPEN.map(IssueStatus::as_str)),
                ],
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "advisory lookup failed");
                ServiceError::SubmissionFailed(e)
            })?
            .into_iter()
            .next()
            .map(|doc| doc.id);

        let body = ConsolidateReport {
            report: &report,
            key: &key,
            issues_path: &issues_path,
            claims_path: &claims_path,
            claim_id: urlencoding::encode(&key).into_owned(),
            advisory,
            new_issue_id: self.store.new_document_id(),
        };

        let outcome = run_transaction(self.store.as_ref(), &body).await.map_err(|e| {
            warn!(error = %e, "report submission failed");
            ServiceError::SubmissionFailed(e)
        })?;

        match &outcome {
            ConsolidationOutcome::Created { issue_id } => {
                metrics::increment_counter!("hostel_reports_total", "outcome" => "created");
                info!(%issue_id, room = %report.room, "new issue created");
            }
            ConsolidationOutcome::Consolidated { issue_id, reporter_count } => {
                metrics::increment_counter!("hostel_reports_total", "outcome" => "consolidated");
                info!(%issue_id, room = %report.room, reporter_count, "report merged into open issue");
            }
            ConsolidationOutcome::AlreadyReported { issue_id } => {
                metrics::increment_counter!("hostel_reports_total", "outcome" => "already_reported");
                info!(%issue_id, room = %report.room, "room already reported this issue");
            }
        }
        Ok(outcome)
    }
}
