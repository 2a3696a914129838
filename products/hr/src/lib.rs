//! HR module: employee directory, leave requests and daily attendance.

mod model;

use std::collections::BTreeMap;

use chrono::Utc;
use platform_api::{
    Action, ApiError, ApiResult, ById, Module, Reply, StatusChange, deleted, reply, validate,
};
use platform_store::{Collection, stats};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

pub use model::*;

#[derive(Clone, Default)]
pub struct HrService {
    employees: Collection<Employee>,
    leave_requests: Collection<LeaveRequest>,
    attendance: Collection<Attendance>,
}

impl HrService {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(name = "hr.create_employee", skip_all, fields(%tenant))]
    pub async fn create_employee(&self, tenant: Uuid, input: NewEmployee) -> ApiResult<Employee> {
        let employee = Employee {
            id: Uuid::new_v4(),
            company_id: tenant,
            name: validate::text("name", &input.name)?,
            email: validate::email("email", &input.email)?,
            department: validate::text("department", &input.department)?,
            position: validate::text("position", &input.position)?,
            salary_cents: validate::non_negative("salaryCents", input.salary_cents)?,
            hire_date: input.hire_date.unwrap_or_else(|| Utc::now().date_naive()),
            status: EmployeeStatus::Active,
            created_at: Utc::now(),
        };
        let employee = self.employees.insert(employee).await;
        info!(
            employee_id = %employee.id,
            department = %employee.department,
            "employee created"
        );
        Ok(employee)
    }

    pub async fn employee(&self, tenant: Uuid, id: Uuid) -> ApiResult<Employee> {
        Ok(self.employees.find(tenant, id).await?)
    }

    pub async fn employees(&self, tenant: Uuid, filter: &EmployeeFilter) -> Vec<Employee> {
        self.employees
            .list(tenant, |e| {
                filter
                    .department
                    .as_deref()
                    .is_none_or(|d| e.department.eq_ignore_ascii_case(d))
                    && filter.status.is_none_or(|s| e.status == s)
            })
            .await
    }

    pub async fn update_employee_status(
        &self,
        tenant: Uuid,
        id: Uuid,
        status: EmployeeStatus,
    ) -> ApiResult<Employee> {
        let employee = self
            .employees
            .update(tenant, id, |e| e.status = status)
            .await?;
        info!(employee_id = %id, ?status, "employee status updated");
        Ok(employee)
    }

    pub async fn delete_employee(&self, tenant: Uuid, id: Uuid) -> ApiResult<Employee> {
        let removed = self.employees.remove(tenant, id).await?;
        info!(employee_id = %id, "employee deleted");
        Ok(removed)
    }

    #[instrument(name = "hr.create_leave_request", skip_all, fields(%tenant))]
    pub async fn create_leave_request(
        &self,
        tenant: Uuid,
        input: NewLeaveRequest,
    ) -> ApiResult<LeaveRequest> {
        self.employees.find(tenant, input.employee_id).await?;
        if input.end_date < input.start_date {
            return Err(ApiError::invalid("endDate must not be before startDate"));
        }
        let days = (input.end_date - input.start_date).num_days() + 1;
        let request = LeaveRequest {
            id: Uuid::new_v4(),
            company_id: tenant,
            employee_id: input.employee_id,
            leave_type: input.leave_type,
            start_date: input.start_date,
            end_date: input.end_date,
            days,
            reason: validate::optional_text(input.reason),
            status: LeaveStatus::Pending,
            created_at: Utc::now(),
        };
        // Rejected requests free their dates again.
        let request = self
            .leave_requests
            .insert_unique(request, |other| {
                other.employee_id == input.employee_id
                    && other.status != LeaveStatus::Rejected
                    && other.start_date <= input.end_date
                    && input.start_date <= other.end_date
            })
            .await
            .map_err(|_| ApiError::invalid("leave request overlaps an existing request"))?;
        info!(
            request_id = %request.id,
            employee_id = %request.employee_id,
            days,
            "leave request created"
        );
        Ok(request)
    }

    pub async fn leave_requests(&self, tenant: Uuid, filter: &LeaveFilter) -> Vec<LeaveRequest> {
        self.leave_requests
            .list(tenant, |r| {
                filter.employee_id.is_none_or(|id| r.employee_id == id)
                    && filter.status.is_none_or(|s| r.status == s)
            })
            .await
    }

    /// Decide a pending request. Decided requests are final.
    pub async fn update_leave_status(
        &self,
        tenant: Uuid,
        id: Uuid,
        status: LeaveStatus,
    ) -> ApiResult<LeaveRequest> {
        let request = self
            .leave_requests
            .try_update(tenant, id, |r| {
                if r.status != LeaveStatus::Pending {
                    return Err(ApiError::invalid(format!(
                        "leave request already {:?}",
                        r.status
                    )));
                }
                r.status = status;
                Ok(())
            })
            .await?;
        info!(request_id = %id, ?status, "leave request decided");
        Ok(request)
    }

    pub async fn record_attendance(
        &self,
        tenant: Uuid,
        input: NewAttendance,
    ) -> ApiResult<Attendance> {
        self.employees.find(tenant, input.employee_id).await?;
        let hours_worked = match (input.check_in, input.check_out) {
            (Some(check_in), Some(check_out)) => {
                if check_out < check_in {
                    return Err(ApiError::invalid("checkOut must not be before checkIn"));
                }
                let minutes = (check_out - check_in).num_minutes();
                stats::round2(minutes as f64 / 60.0)
            }
            _ => 0.0,
        };
        let record = Attendance {
            id: Uuid::new_v4(),
            company_id: tenant,
            employee_id: input.employee_id,
            date: input.date,
            check_in: input.check_in,
            check_out: input.check_out,
            hours_worked,
            status: input.status,
            created_at: Utc::now(),
        };
        let record = self
            .attendance
            .insert_unique(record, |other| {
                other.employee_id == input.employee_id && other.date == input.date
            })
            .await
            .map_err(|_| {
                ApiError::invalid(format!("attendance for {} already recorded", input.date))
            })?;
        info!(
            attendance_id = %record.id,
            employee_id = %record.employee_id,
            "attendance recorded"
        );
        Ok(record)
    }

    pub async fn attendance(&self, tenant: Uuid, filter: &AttendanceFilter) -> Vec<Attendance> {
        self.attendance
            .list(tenant, |a| {
                filter.employee_id.is_none_or(|id| a.employee_id == id)
                    && filter.date.is_none_or(|d| a.date == d)
            })
            .await
    }

    pub async fn metrics(&self, tenant: Uuid) -> HrMetrics {
        let employees = self.employees.all(tenant).await;
        let leave = self.leave_requests.all(tenant).await;
        let attendance = self.attendance.all(tenant).await;

        let active: Vec<&Employee> = employees
            .iter()
            .filter(|e| e.status == EmployeeStatus::Active)
            .collect();
        let active_payroll = stats::cents(active.iter().map(|e| e.salary_cents));
        let attended = attendance
            .iter()
            .filter(|a| a.status != AttendanceStatus::Absent)
            .count();

        let mut headcount_by_department = BTreeMap::new();
        for employee in employees
            .iter()
            .filter(|e| e.status != EmployeeStatus::Terminated)
        {
            *headcount_by_department
                .entry(employee.department.clone())
                .or_insert(0) += 1;
        }

        HrMetrics {
            total_employees: employees.len(),
            active_employees: active.len(),
            on_leave: employees
                .iter()
                .filter(|e| e.status == EmployeeStatus::OnLeave)
                .count(),
            pending_leave_requests: leave
                .iter()
                .filter(|r| r.status == LeaveStatus::Pending)
                .count(),
            attendance_rate: stats::percentage(attended, attendance.len()),
            average_salary_cents: if active.is_empty() {
                0
            } else {
                active_payroll / active.len() as i64
            },
            monthly_payroll_cents: active_payroll / 12,
            headcount_by_department,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HrQuery {
    Metrics,
    GetEmployee(ById),
    ListEmployees(EmployeeFilter),
    ListLeaveRequests(LeaveFilter),
    ListAttendance(AttendanceFilter),
}

impl Action for HrQuery {
    fn name(&self) -> &'static str {
        match self {
            HrQuery::Metrics => "metrics",
            HrQuery::GetEmployee(_) => "getEmployee",
            HrQuery::ListEmployees(_) => "listEmployees",
            HrQuery::ListLeaveRequests(_) => "listLeaveRequests",
            HrQuery::ListAttendance(_) => "listAttendance",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HrCommand {
    CreateEmployee(NewEmployee),
    UpdateEmployeeStatus(StatusChange<EmployeeStatus>),
    DeleteEmployee(ById),
    CreateLeaveRequest(NewLeaveRequest),
    UpdateLeaveStatus(StatusChange<LeaveStatus>),
    RecordAttendance(NewAttendance),
}

impl Action for HrCommand {
    fn name(&self) -> &'static str {
        match self {
            HrCommand::CreateEmployee(_) => "createEmployee",
            HrCommand::UpdateEmployeeStatus(_) => "updateEmployeeStatus",
            HrCommand::DeleteEmployee(_) => "deleteEmployee",
            HrCommand::CreateLeaveRequest(_) => "createLeaveRequest",
            HrCommand::UpdateLeaveStatus(_) => "updateLeaveStatus",
            HrCommand::RecordAttendance(_) => "recordAttendance",
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, HrCommand::DeleteEmployee(_))
    }
}

impl Module for HrService {
    const NAME: &'static str = "hr";

    type Query = HrQuery;
    type Command = HrCommand;

    async fn query(&self, tenant: Uuid, query: HrQuery) -> ApiResult<Reply> {
        match query {
            HrQuery::Metrics => reply(&self.metrics(tenant).await),
            HrQuery::GetEmployee(ById { id }) => reply(&self.employee(tenant, id).await?),
            HrQuery::ListEmployees(filter) => reply(&self.employees(tenant, &filter).await),
            HrQuery::ListLeaveRequests(filter) => {
                reply(&self.leave_requests(tenant, &filter).await)
            }
            HrQuery::ListAttendance(filter) => reply(&self.attendance(tenant, &filter).await),
        }
    }

    async fn command(&self, tenant: Uuid, command: HrCommand) -> ApiResult<Reply> {
        match command {
            HrCommand::CreateEmployee(input) => {
                Reply::created(&self.create_employee(tenant, input).await?)
            }
            HrCommand::UpdateEmployeeStatus(change) => reply(
                &self
                    .update_employee_status(tenant, change.id, change.status)
                    .await?,
            ),
            HrCommand::DeleteEmployee(ById { id }) => {
                self.delete_employee(tenant, id).await?;
                deleted(id)
            }
            HrCommand::CreateLeaveRequest(input) => {
                Reply::created(&self.create_leave_request(tenant, input).await?)
            }
            HrCommand::UpdateLeaveStatus(change) => reply(
                &self
                    .update_leave_status(tenant, change.id, change.status)
                    .await?,
            ),
            HrCommand::RecordAttendance(input) => {
                Reply::created(&self.record_attendance(tenant, input).await?)
            }
        }
    }
}
