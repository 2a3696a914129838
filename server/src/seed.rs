//! Demo records for a fresh in-memory instance.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use platform_api::StatusChange;
use products_assets::{DepreciationMethod, NewAsset};
use products_compliance::{ControlStatus, NewAudit, NewControl};
use products_crm::{LeadSource, NewLead, NewOpportunity};
use products_finance::{InvoiceLine, InvoiceStatus, InvoiceUpdate, NewExpense, NewInvoice};
use products_hr::{AttendanceStatus, LeaveType, NewAttendance, NewEmployee, NewLeaveRequest};
use products_inventory::{MovementKind, NewMovement, NewProduct};
use products_logistics::{NewShipment, NewVehicle};
use products_maintenance::{NewEquipment, NewWorkOrder, Priority, WorkKind};
use products_procurement::{NewPurchaseOrder, NewSupplier, OrderLine};
use products_quality::{InspectionResult, NewInspection};
use products_surveys::{NewResponse, NewSurvey, SurveyStatus};
use tracing::info;
use uuid::Uuid;

use crate::Modules;

/// Populate every module with a small data set for `company`.
pub async fn demo(modules: &Modules, company: Uuid) -> Result<()> {
    let today = Utc::now().date_naive();
    people(modules, company, today).await?;
    sales_and_stock(modules, company, today).await?;
    operations(modules, company, today).await?;
    governance(modules, company, today).await?;
    info!(%company, "demo data seeded");
    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).with_context(|| format!("invalid date {y}-{m}-{d}"))
}

fn time(h: u32, m: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0).with_context(|| format!("invalid time {h}:{m}"))
}

async fn people(modules: &Modules, company: Uuid, today: NaiveDate) -> Result<()> {
    let staff = [
        ("Ada Lovelace", "ada@example.com", "Engineering", "Lead engineer", 9_800_000),
        ("Grace Hopper", "grace@example.com", "Engineering", "Compiler engineer", 9_200_000),
        ("Ken Adams", "ken@example.com", "Sales", "Account executive", 6_400_000),
        ("Mira Patel", "mira@example.com", "Operations", "Quality lead", 7_100_000),
    ];
    let mut employees = Vec::new();
    for (name, email, department, position, salary_cents) in staff {
        let employee = modules
            .hr
            .create_employee(
                company,
                NewEmployee {
                    name: name.into(),
                    email: email.into(),
                    department: department.into(),
                    position: position.into(),
                    salary_cents,
                    hire_date: Some(date(2022, 3, 1)?),
                },
            )
            .await?;
        employees.push(employee);
    }

    let ada = &employees[0];
    modules
        .hr
        .create_leave_request(
            company,
            NewLeaveRequest {
                employee_id: ada.id,
                leave_type: LeaveType::Annual,
                start_date: today + Duration::days(14),
                end_date: today + Duration::days(18),
                reason: Some("Family trip".into()),
            },
        )
        .await?;
    for employee in &employees {
        modules
            .hr
            .record_attendance(
                company,
                NewAttendance {
                    employee_id: employee.id,
                    date: today,
                    check_in: Some(time(9, 0)?),
                    check_out: Some(time(17, 30)?),
                    status: AttendanceStatus::Present,
                },
            )
            .await?;
    }

    let survey = modules
        .surveys
        .create_survey(
            company,
            NewSurvey {
                title: "Quarterly pulse".into(),
                description: Some("How is work going?".into()),
            },
        )
        .await?;
    modules
        .surveys
        .update_survey_status(
            company,
            StatusChange {
                id: survey.id,
                status: SurveyStatus::Active,
            },
        )
        .await?;
    for rating in [5, 4, 4, 3, 2] {
        modules
            .surveys
            .submit_response(
                company,
                NewResponse {
                    survey_id: survey.id,
                    respondent: None,
                    rating,
                    comment: None,
                },
            )
            .await?;
    }
    Ok(())
}

async fn sales_and_stock(modules: &Modules, company: Uuid, today: NaiveDate) -> Result<()> {
    let lead = modules
        .crm
        .create_lead(
            company,
            NewLead {
                name: "Hank Scorpio".into(),
                email: "hank@globex.example".into(),
                organization: Some("Globex".into()),
                source: LeadSource::Referral,
                estimated_value_cents: 2_500_000,
            },
        )
        .await?;
    modules
        .crm
        .create_opportunity(
            company,
            NewOpportunity {
                lead_id: Some(lead.id),
                title: "Globex rollout".into(),
                amount_cents: 2_500_000,
                probability: 60,
                expected_close: Some(today + Duration::days(45)),
            },
        )
        .await?;

    let bolts = modules
        .inventory
        .create_product(
            company,
            NewProduct {
                sku: "BOLT-M8".into(),
                name: "M8 hex bolt".into(),
                category: "Fasteners".into(),
                unit_cost_cents: 12,
                quantity: 5_000,
                reorder_level: 1_000,
            },
        )
        .await?;
    modules
        .inventory
        .record_movement(
            company,
            NewMovement {
                product_id: bolts.id,
                kind: MovementKind::Issue,
                quantity: 4_200,
                reference: Some("WO-assembly".into()),
            },
        )
        .await?;

    let supplier = modules
        .procurement
        .create_supplier(
            company,
            NewSupplier {
                name: "Acme Fasteners".into(),
                email: "orders@acme.example".into(),
                category: "Fasteners".into(),
                rating: 4.5,
            },
        )
        .await?;
    modules
        .procurement
        .create_purchase_order(
            company,
            NewPurchaseOrder {
                supplier_id: supplier.id,
                lines: vec![OrderLine {
                    description: "M8 hex bolt".into(),
                    quantity: 10_000,
                    unit_price_cents: 11,
                }],
                expected_date: Some(today + Duration::days(7)),
            },
        )
        .await?;

    let invoice = modules
        .finance
        .create_invoice(
            company,
            NewInvoice {
                customer: "Globex".into(),
                lines: vec![InvoiceLine {
                    description: "Implementation".into(),
                    quantity: 1,
                    unit_price_cents: 1_200_000,
                }],
                tax_rate: 20.0,
                issue_date: today - Duration::days(40),
                due_date: today - Duration::days(10),
            },
        )
        .await?;
    modules
        .finance
        .update_invoice_status(
            company,
            InvoiceUpdate {
                id: invoice.id,
                status: InvoiceStatus::Sent,
                paid_on: None,
            },
        )
        .await?;
    modules.finance.mark_overdue(company, today).await?;
    modules
        .finance
        .submit_expense(
            company,
            NewExpense {
                category: "Travel".into(),
                description: "Client visit".into(),
                amount_cents: 84_000,
                incurred_on: today - Duration::days(3),
            },
        )
        .await?;
    Ok(())
}

async fn operations(modules: &Modules, company: Uuid, today: NaiveDate) -> Result<()> {
    let press = modules
        .maintenance
        .create_equipment(
            company,
            NewEquipment {
                name: "Hydraulic press".into(),
                location: "Hall B".into(),
                last_service_date: Some(today - Duration::days(170)),
                next_service_date: Some(today + Duration::days(10)),
            },
        )
        .await?;
    modules
        .maintenance
        .create_work_order(
            company,
            NewWorkOrder {
                equipment_id: press.id,
                title: "Replace seals".into(),
                kind: WorkKind::Preventive,
                priority: Priority::Medium,
                cost_cents: 35_000,
            },
        )
        .await?;

    let inspection = modules
        .quality
        .schedule_inspection(
            company,
            NewInspection {
                reference: "LOT-1001".into(),
                inspector: "Mira Patel".into(),
            },
        )
        .await?;
    modules
        .quality
        .record_result(
            company,
            InspectionResult {
                id: inspection.id,
                items_checked: 200,
                defects_found: 1,
                acceptable_defects: 2,
                inspected_on: Some(today),
            },
        )
        .await?;

    modules
        .logistics
        .create_shipment(
            company,
            NewShipment {
                origin: "Rotterdam".into(),
                destination: "Lyon".into(),
                carrier: "Nordfreight".into(),
                weight_kg: 420.0,
                cost_cents: 68_000,
                ship_date: today,
                estimated_delivery: today + Duration::days(3),
            },
        )
        .await?;
    modules
        .logistics
        .register_vehicle(
            company,
            NewVehicle {
                plate: "NL-482-KT".into(),
                capacity_kg: 3_500.0,
            },
        )
        .await?;

    modules
        .assets
        .register(
            company,
            NewAsset {
                name: "CNC lathe".into(),
                category: "Machinery".into(),
                purchase_date: date(2021, 6, 1)?,
                cost_cents: 4_800_000,
                salvage_value_cents: 300_000,
                useful_life_years: 8,
                method: DepreciationMethod::StraightLine,
            },
        )
        .await?;
    Ok(())
}

async fn governance(modules: &Modules, company: Uuid, today: NaiveDate) -> Result<()> {
    let controls = [
        ("A.5.1", "Information security policy", ControlStatus::Compliant),
        ("A.8.2", "Privileged access rights", ControlStatus::InProgress),
        ("A.7.4", "Physical security monitoring", ControlStatus::NotApplicable),
    ];
    for (reference, title, status) in controls {
        let control = modules
            .compliance
            .create_control(
                company,
                NewControl {
                    framework: "ISO27001".into(),
                    reference: reference.into(),
                    title: title.into(),
                    owner: Some("Ada Lovelace".into()),
                    due_date: Some(today + Duration::days(30)),
                },
            )
            .await?;
        modules
            .compliance
            .update_control_status(
                company,
                StatusChange {
                    id: control.id,
                    status,
                },
            )
            .await?;
    }
    modules
        .compliance
        .schedule_audit(
            company,
            NewAudit {
                title: "ISO surveillance audit".into(),
                framework: "ISO27001".into(),
                auditor: "External".into(),
                scheduled_for: today + Duration::days(60),
            },
        )
        .await?;
    Ok(())
}
