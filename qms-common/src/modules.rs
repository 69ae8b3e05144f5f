//! Module registry
//!
//! Every CRUD page of the station's quality system is a "module": a storage
//! key, a label, and the record fields its search form filters on. The same
//! key names the module's array inside the local blob and its rows in the
//! table store, so keys must never change once records exist.

use serde::Serialize;

use crate::{Error, Result};

/// Grouping used for navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Personnel,
    Equipment,
    Documents,
    Audits,
    Management,
    Standards,
    Customer,
}

/// Static description of one module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    /// Storage key (blob key and table partition)
    pub key: &'static str,
    /// Display label
    pub label: &'static str,
    pub category: Category,
    /// Fields offered by the module's search form
    pub search_fields: &'static [&'static str],
}

const fn module(
    key: &'static str,
    label: &'static str,
    category: Category,
    search_fields: &'static [&'static str],
) -> ModuleInfo {
    ModuleInfo {
        key,
        label,
        category,
        search_fields,
    }
}

use Category::*;

/// All modules, in navigation order
pub static MODULES: &[ModuleInfo] = &[
    // Personnel
    module("personnelFiles", "Personnel Files", Personnel, &["name", "department", "position"]),
    module("trainingRecords", "Training Records", Personnel, &["title", "trainer", "participants"]),
    module("trainingPlans", "Training Plans", Personnel, &["title", "year", "department"]),
    module("staffAuthorizations", "Staff Authorizations", Personnel, &["name", "scope"]),
    module("competencyAssessments", "Competency Assessments", Personnel, &["name", "assessor", "result"]),
    module("supervisionRecords", "Supervision Records", Personnel, &["supervisor", "supervisee", "date"]),
    // Equipment
    module("deviceLedger", "Device Ledger", Equipment, &["deviceName", "deviceNo", "model", "status"]),
    module("calibrationRecords", "Calibration Records", Equipment, &["deviceName", "deviceNo", "agency"]),
    module("intermediateChecks", "Intermediate Checks", Equipment, &["deviceName", "checker", "result"]),
    module("maintenanceRecords", "Maintenance Records", Equipment, &["deviceName", "maintainer"]),
    module("repairRecords", "Repair Records", Equipment, &["deviceName", "fault", "repairer"]),
    module("equipmentScrapping", "Equipment Scrapping", Equipment, &["deviceName", "reason"]),
    module("equipmentUsageLogs", "Equipment Usage Logs", Equipment, &["deviceName", "operator", "date"]),
    module("referenceMaterials", "Reference Materials", Equipment, &["name", "batchNo", "supplier"]),
    // Documents
    module("documentControl", "Document Control", Documents, &["docNo", "title", "version"]),
    module("documentChanges", "Document Changes", Documents, &["docNo", "title", "applicant"]),
    module("documentDistribution", "Document Distribution", Documents, &["docNo", "recipient"]),
    module("externalDocuments", "External Documents", Documents, &["docNo", "title", "source"]),
    module("recordArchive", "Record Archive", Documents, &["recordName", "archiveNo", "keeper"]),
    // Audits
    module("internalAuditPlans", "Internal Audit Plans", Audits, &["year", "leadAuditor"]),
    module("internalAuditChecklists", "Internal Audit Checklists", Audits, &["department", "auditor", "clause"]),
    module("internalAuditReports", "Internal Audit Reports", Audits, &["title", "leadAuditor"]),
    module("nonconformities", "Nonconformities", Audits, &["department", "description", "status"]),
    module("correctiveActions", "Corrective Actions", Audits, &["source", "owner", "status"]),
    module("riskOpportunities", "Risks and Opportunities", Audits, &["item", "owner", "level"]),
    // Management
    module("managementReviews", "Management Reviews", Management, &["year", "chair", "topic"]),
    module("qualityObjectives", "Quality Objectives", Management, &["objective", "department", "year"]),
    module("annualWorkPlans", "Annual Work Plans", Management, &["year", "title"]),
    module("supplierEvaluations", "Supplier Evaluations", Management, &["supplier", "category", "result"]),
    module("purchaseRecords", "Purchase Records", Management, &["item", "supplier", "purchaser"]),
    module("environmentRecords", "Environment Records", Management, &["location", "recorder", "date"]),
    // Standards
    module("standardsTracking", "Standards Tracking", Standards, &["standardNo", "title", "status"]),
    module("methodVerifications", "Method Verifications", Standards, &["standardNo", "method", "verifier"]),
    module("proficiencyTesting", "Proficiency Testing", Standards, &["scheme", "provider", "result"]),
    module("qualityControlPlans", "Quality Control Plans", Standards, &["year", "item", "owner"]),
    module("uncertaintyEvaluations", "Uncertainty Evaluations", Standards, &["item", "evaluator"]),
    // Customer
    module("complaints", "Complaints", Customer, &["complainant", "plateNo", "status"]),
    module("customerFeedback", "Customer Feedback", Customer, &["customer", "channel", "rating"]),
    module("confidentialityAgreements", "Confidentiality Agreements", Customer, &["name", "signDate"]),
    module("reportCorrections", "Report Corrections", Customer, &["reportNo", "plateNo", "reason"]),
];

/// All registered modules
pub fn all() -> &'static [ModuleInfo] {
    MODULES
}

/// Look up a module by storage key
pub fn find(key: &str) -> Option<&'static ModuleInfo> {
    MODULES.iter().find(|m| m.key == key)
}

/// Look up a module by storage key, rejecting unknown keys
pub fn require(key: &str) -> Result<&'static ModuleInfo> {
    find(key).ok_or_else(|| Error::InvalidInput(format!("Unknown module: {}", key)))
}
