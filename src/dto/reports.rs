use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{models::Report, status::ReportStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct FileReportRequest {
    pub report_type: String,
    pub description: Option<String>,
}

/// Compare-and-set: `from` is the status the caller last read.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReportStatusRequest {
    pub from: ReportStatus,
    pub to: ReportStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportList {
    pub items: Vec<Report>,
}
