//! Final markdown report: one section per vendor with its contact details
//! and how the conversation ended.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::Utc;

use crate::config::QuoteRequest;
use crate::error::Result;
use crate::state_machine::Job;
use crate::vendor::{Vendor, VendorId};

/// Vendor id → outcome line, over every job of the run.
pub fn collect_outcomes<'a>(
    jobs: impl IntoIterator<Item = &'a Job>,
) -> BTreeMap<VendorId, String> {
    jobs.into_iter()
        .map(|job| (job.vendor_id.clone(), job.outcome_line()))
        .collect()
}

pub struct ReportRenderer {
    path: PathBuf,
}

impl ReportRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writes the report and returns where it went.
    pub fn render(
        &self,
        request: &QuoteRequest,
        vendors: &[Vendor],
        outcomes: &BTreeMap<VendorId, String>,
    ) -> Result<PathBuf> {
        let doc = render_markdown(request, vendors, outcomes);
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, doc)?;
        tracing::info!(path = %self.path.display(), vendors = vendors.len(), "report written");
        Ok(self.path.clone())
    }
}

pub fn render_markdown(
    request: &QuoteRequest,
    vendors: &[Vendor],
    outcomes: &BTreeMap<VendorId, String>,
) -> String {
    let mut doc = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(doc, "# Quotato Quote Report\n");
    let _ = writeln!(
        doc,
        "_{} in {}, generated {}_\n",
        request.service,
        request.location,
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    );

    if vendors.is_empty() {
        let _ = writeln!(doc, "No vendors were found.");
        return doc;
    }

    // Ids follow discovery order, the same way jobs were keyed.
    for (index, vendor) in vendors.iter().enumerate() {
        let _ = writeln!(doc, "## {}", vendor.name);
        if let Some(email) = vendor.email.as_deref().filter(|e| !e.is_empty()) {
            let _ = writeln!(doc, "- Email: {email}");
        }
        if let Some(url) = vendor.contact_form_url.as_deref().filter(|u| !u.is_empty()) {
            let _ = writeln!(doc, "- Form: [Online Form]({url})");
        }
        if let Some(phone) = vendor.phone.as_deref().filter(|p| !p.is_empty()) {
            let _ = writeln!(doc, "- Phone: {phone}");
        }
        let response = outcomes
            .get(&VendorId::new(index, &vendor.name))
            .map(String::as_str)
            .unwrap_or("No response");
        let _ = writeln!(doc, "- Response: {response}\n");
    }
    doc
}
