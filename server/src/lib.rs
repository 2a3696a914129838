//! ERP suite server: configuration, the HTTP surface over every business
//! module, and demo data.

pub mod config;
pub mod http;
pub mod seed;

use std::sync::Arc;

use platform_api::Module;
use products_assets::AssetService;
use products_compliance::ComplianceService;
use products_crm::CrmService;
use products_finance::FinanceService;
use products_hr::HrService;
use products_inventory::InventoryService;
use products_logistics::LogisticsService;
use products_maintenance::MaintenanceService;
use products_procurement::ProcurementService;
use products_quality::QualityService;
use products_surveys::SurveyService;

/// One shared instance of every business module.
#[derive(Clone, Default)]
pub struct Modules {
    pub hr: Arc<HrService>,
    pub crm: Arc<CrmService>,
    pub inventory: Arc<InventoryService>,
    pub procurement: Arc<ProcurementService>,
    pub maintenance: Arc<MaintenanceService>,
    pub quality: Arc<QualityService>,
    pub logistics: Arc<LogisticsService>,
    pub assets: Arc<AssetService>,
    pub compliance: Arc<ComplianceService>,
    pub surveys: Arc<SurveyService>,
    pub finance: Arc<FinanceService>,
}

impl Modules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route names in mount order.
    pub fn names() -> Vec<&'static str> {
        vec![
            HrService::NAME,
            CrmService::NAME,
            InventoryService::NAME,
            ProcurementService::NAME,
            MaintenanceService::NAME,
            QualityService::NAME,
            LogisticsService::NAME,
            AssetService::NAME,
            ComplianceService::NAME,
            SurveyService::NAME,
            FinanceService::NAME,
        ]
    }
}
