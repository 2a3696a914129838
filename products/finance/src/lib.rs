//! Finance module: customer invoices and expense claims.

use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{Action, ApiError, ApiResult, Module, Reply, StatusChange, reply, validate};
use platform_store::{Collection, record, stats};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub number: String,
    pub customer: String,
    pub lines: Vec<InvoiceLine>,
    pub subtotal_cents: i64,
    pub tax_rate: f64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn is_final(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    pub fn is_outstanding(self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub company_id: Uuid,
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub incurred_on: NaiveDate,
    pub status: ExpenseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

record!(Invoice, "invoice");
record!(Expense, "expense");

/// `subtotal * rate / 100`, rounded half away from zero.
pub fn tax_cents(subtotal_cents: i64, rate_percent: f64) -> i64 {
    (subtotal_cents as f64 * rate_percent / 100.0).round() as i64
}

fn invoice_number() -> String {
    format!("INV-{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub customer: String,
    pub lines: Vec<InvoiceLine>,
    #[serde(default)]
    pub tax_rate: f64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceUpdate {
    pub id: Uuid,
    pub status: InvoiceStatus,
    /// Payment date when `status` is `PAID`; defaults to today.
    pub paid_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub incurred_on: NaiveDate,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub customer: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseFilter {
    pub status: Option<ExpenseStatus>,
    pub category: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinanceMetrics {
    pub revenue_cents: i64,
    pub outstanding_cents: i64,
    pub overdue_invoices: usize,
    pub tax_collected_cents: i64,
    pub approved_expenses_cents: i64,
    pub pending_expenses: usize,
    pub net_income_cents: i64,
}

#[derive(Clone, Default)]
pub struct FinanceService {
    invoices: Collection<Invoice>,
    expenses: Collection<Expense>,
}

impl FinanceService {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(name = "finance.create_invoice", skip_all, fields(%tenant))]
    pub async fn create_invoice(&self, tenant: Uuid, input: NewInvoice) -> ApiResult<Invoice> {
        let customer = validate::text("customer", &input.customer)?;
        let tax_rate = validate::within("taxRate", input.tax_rate, 0.0, 100.0)?;
        if input.due_date < input.issue_date {
            return Err(ApiError::invalid("dueDate must not be before issueDate"));
        }
        if input.lines.is_empty() {
            return Err(ApiError::invalid("an invoice needs at least one line"));
        }
        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            lines.push(InvoiceLine {
                description: validate::text("description", &line.description)?,
                quantity: validate::positive("quantity", line.quantity)?,
                unit_price_cents: validate::non_negative(
                    "unitPriceCents",
                    line.unit_price_cents,
                )?,
            });
        }
        let line_totals = lines
            .iter()
            .map(|l| validate::line_total("line total", l.quantity, l.unit_price_cents))
            .collect::<ApiResult<Vec<i64>>>()?;
        let subtotal_cents = validate::total("subtotalCents", line_totals)?;
        let tax = tax_cents(subtotal_cents, tax_rate);
        let total_cents = validate::total("totalCents", [subtotal_cents, tax])?;

        let invoice = Invoice {
            id: Uuid::new_v4(),
            company_id: tenant,
            number: invoice_number(),
            customer,
            lines,
            subtotal_cents,
            tax_rate,
            tax_cents: tax,
            total_cents,
            status: InvoiceStatus::Draft,
            issue_date: input.issue_date,
            due_date: input.due_date,
            paid_on: None,
            created_at: Utc::now(),
        };
        let invoice = self.invoices.insert(invoice).await;
        info!(
            invoice_id = %invoice.id,
            number = %invoice.number,
            total_cents = invoice.total_cents,
            "invoice created"
        );
        Ok(invoice)
    }

    pub async fn invoices(&self, tenant: Uuid, filter: &InvoiceFilter) -> Vec<Invoice> {
        self.invoices
            .list(tenant, |i| {
                filter.status.is_none_or(|s| i.status == s)
                    && filter
                        .customer
                        .as_deref()
                        .is_none_or(|c| i.customer.eq_ignore_ascii_case(c))
            })
            .await
    }

    pub async fn update_invoice_status(
        &self,
        tenant: Uuid,
        update: InvoiceUpdate,
    ) -> ApiResult<Invoice> {
        let today = Utc::now().date_naive();
        let invoice = self
            .invoices
            .try_update(tenant, update.id, |i| {
                if i.status.is_final() {
                    return Err(ApiError::invalid(format!(
                        "invoice {} is {:?} and cannot change",
                        i.number, i.status
                    )));
                }
                i.status = update.status;
                if update.status == InvoiceStatus::Paid {
                    i.paid_on = Some(update.paid_on.unwrap_or(today));
                }
                Ok(())
            })
            .await?;
        info!(invoice_id = %invoice.id, status = ?invoice.status, "invoice updated");
        Ok(invoice)
    }

    /// Flags every sent invoice past its due date. Returns how many changed.
    pub async fn mark_overdue(&self, tenant: Uuid, today: NaiveDate) -> ApiResult<usize> {
        let late = self
            .invoices
            .list(tenant, |i| i.status == InvoiceStatus::Sent && i.due_date < today)
            .await;
        let mut flagged = 0;
        for invoice in late {
            self.invoices
                .update(tenant, invoice.id, |i| {
                    if i.status == InvoiceStatus::Sent {
                        i.status = InvoiceStatus::Overdue;
                        flagged += 1;
                    }
                })
                .await?;
        }
        if flagged > 0 {
            warn!(%tenant, flagged, "invoices marked overdue");
        }
        Ok(flagged)
    }

    pub async fn submit_expense(&self, tenant: Uuid, input: NewExpense) -> ApiResult<Expense> {
        let expense = Expense {
            id: Uuid::new_v4(),
            company_id: tenant,
            category: validate::text("category", &input.category)?,
            description: validate::text("description", &input.description)?,
            amount_cents: validate::positive("amountCents", input.amount_cents)?,
            incurred_on: input.incurred_on,
            status: ExpenseStatus::Pending,
            created_at: Utc::now(),
        };
        let expense = self.expenses.insert(expense).await;
        info!(expense_id = %expense.id, amount_cents = expense.amount_cents, "expense submitted");
        Ok(expense)
    }

    pub async fn expenses(&self, tenant: Uuid, filter: &ExpenseFilter) -> Vec<Expense> {
        self.expenses
            .list(tenant, |e| {
                filter.status.is_none_or(|s| e.status == s)
                    && filter
                        .category
                        .as_deref()
                        .is_none_or(|c| e.category.eq_ignore_ascii_case(c))
            })
            .await
    }

    pub async fn update_expense_status(
        &self,
        tenant: Uuid,
        change: StatusChange<ExpenseStatus>,
    ) -> ApiResult<Expense> {
        let expense = self
            .expenses
            .update(tenant, change.id, |e| e.status = change.status)
            .await?;
        info!(expense_id = %expense.id, status = ?expense.status, "expense reviewed");
        Ok(expense)
    }

    pub async fn metrics(&self, tenant: Uuid) -> FinanceMetrics {
        let invoices = self.invoices.all(tenant).await;
        let expenses = self.expenses.all(tenant).await;
        let paid = || invoices.iter().filter(|i| i.status == InvoiceStatus::Paid);

        let revenue_cents = stats::cents(paid().map(|i| i.total_cents));
        let approved_expenses_cents = stats::cents(
            expenses
                .iter()
                .filter(|e| e.status == ExpenseStatus::Approved)
                .map(|e| e.amount_cents),
        );

        FinanceMetrics {
            revenue_cents,
            outstanding_cents: stats::cents(
                invoices
                    .iter()
                    .filter(|i| i.status.is_outstanding())
                    .map(|i| i.total_cents),
            ),
            overdue_invoices: invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Overdue)
                .count(),
            tax_collected_cents: stats::cents(paid().map(|i| i.tax_cents)),
            approved_expenses_cents,
            pending_expenses: expenses
                .iter()
                .filter(|e| e.status == ExpenseStatus::Pending)
                .count(),
            net_income_cents: revenue_cents.saturating_sub(approved_expenses_cents),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FinanceQuery {
    Metrics,
    ListInvoices(InvoiceFilter),
    ListExpenses(ExpenseFilter),
}

impl Action for FinanceQuery {
    fn name(&self) -> &'static str {
        match self {
            FinanceQuery::Metrics => "metrics",
            FinanceQuery::ListInvoices(_) => "listInvoices",
            FinanceQuery::ListExpenses(_) => "listExpenses",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FinanceCommand {
    CreateInvoice(NewInvoice),
    UpdateInvoiceStatus(InvoiceUpdate),
    MarkOverdue,
    SubmitExpense(NewExpense),
    UpdateExpenseStatus(StatusChange<ExpenseStatus>),
}

impl Action for FinanceCommand {
    fn name(&self) -> &'static str {
        match self {
            FinanceCommand::CreateInvoice(_) => "createInvoice",
            FinanceCommand::UpdateInvoiceStatus(_) => "updateInvoiceStatus",
            FinanceCommand::MarkOverdue => "markOverdue",
            FinanceCommand::SubmitExpense(_) => "submitExpense",
            FinanceCommand::UpdateExpenseStatus(_) => "updateExpenseStatus",
        }
    }
}

impl Module for FinanceService {
    const NAME: &'static str = "finance";

    type Query = FinanceQuery;
    type Command = FinanceCommand;

    async fn query(&self, tenant: Uuid, query: FinanceQuery) -> ApiResult<Reply> {
        match query {
            FinanceQuery::Metrics => reply(&self.metrics(tenant).await),
            FinanceQuery::ListInvoices(filter) => reply(&self.invoices(tenant, &filter).await),
            FinanceQuery::ListExpenses(filter) => reply(&self.expenses(tenant, &filter).await),
        }
    }

    async fn command(&self, tenant: Uuid, command: FinanceCommand) -> ApiResult<Reply> {
        match command {
            FinanceCommand::CreateInvoice(input) => {
                Reply::created(&self.create_invoice(tenant, input).await?)
            }
            FinanceCommand::UpdateInvoiceStatus(update) => {
                reply(&self.update_invoice_status(tenant, update).await?)
            }
            FinanceCommand::MarkOverdue => {
                let flagged = self.mark_overdue(tenant, Utc::now().date_naive()).await?;
                reply(&json!({ "flagged": flagged }))
            }
            FinanceCommand::SubmitExpense(input) => {
                Reply::created(&self.submit_expense(tenant, input).await?)
            }
            FinanceCommand::UpdateExpenseStatus(change) => {
                reply(&self.update_expense_status(tenant, change).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn consulting(tax_rate: f64) -> NewInvoice {
        NewInvoice {
            customer: "Globex".into(),
            lines: vec![
                InvoiceLine {
                    description: "Workshop".into(),
                    quantity: 2,
                    unit_price_cents: 45_000,
                },
                InvoiceLine {
                    description: "Travel".into(),
                    quantity: 1,
                    unit_price_cents: 12_345,
                },
            ],
            tax_rate,
            issue_date: date(2024, 5, 1),
            due_date: date(2024, 5, 31),
        }
    }

    fn status(id: Uuid, status: InvoiceStatus) -> InvoiceUpdate {
        InvoiceUpdate {
            id,
            status,
            paid_on: None,
        }
    }

    #[test]
    fn tax_rounds_to_the_nearest_cent() {
        assert_eq!(tax_cents(10_000, 19.0), 1_900);
        assert_eq!(tax_cents(102_345, 7.5), 7_676);
        assert_eq!(tax_cents(0, 20.0), 0);
    }

    #[tokio::test]
    async fn invoice_totals_and_numbering() {
        let finance = FinanceService::new();
        let tenant = Uuid::new_v4();
        let invoice = finance.create_invoice(tenant, consulting(20.0)).await.unwrap();

        assert_eq!(invoice.subtotal_cents, 102_345);
        assert_eq!(invoice.tax_cents, 20_469);
        assert_eq!(invoice.total_cents, 122_814);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(invoice.number.starts_with("INV-"));
        assert_eq!(invoice.number.len(), 10);
    }

    #[tokio::test]
    async fn invoice_input_is_validated() {
        let finance = FinanceService::new();
        let tenant = Uuid::new_v4();
        let mut backdated = consulting(10.0);
        backdated.due_date = backdated.issue_date - Duration::days(1);
        let mut huge_line = consulting(0.0);
        huge_line.lines[0].quantity = 10_000_000_000;
        huge_line.lines[0].unit_price_cents = 10_000_000_000;
        let mut huge_subtotal = consulting(0.0);
        huge_subtotal.lines[0].quantity = 1;
        huge_subtotal.lines[0].unit_price_cents = i64::MAX;
        let mut huge_total = consulting(10.0);
        huge_total.lines.truncate(1);
        huge_total.lines[0].quantity = 1;
        huge_total.lines[0].unit_price_cents = i64::MAX - 1;

        let rejected = [
            consulting(150.0),
            consulting(-1.0),
            backdated,
            huge_line,
            huge_subtotal,
            huge_total,
        ];
        for input in rejected {
            assert!(matches!(
                finance.create_invoice(tenant, input).await,
                Err(ApiError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn paid_and_void_invoices_are_final() {
        let finance = FinanceService::new();
        let tenant = Uuid::new_v4();
        let invoice = finance.create_invoice(tenant, consulting(0.0)).await.unwrap();

        let paid = finance
            .update_invoice_status(tenant, status(invoice.id, InvoiceStatus::Paid))
            .await
            .unwrap();
        assert_eq!(paid.paid_on, Some(Utc::now().date_naive()));
        assert!(matches!(
            finance
                .update_invoice_status(tenant, status(invoice.id, InvoiceStatus::Void))
                .await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn overdue_sweep_and_metrics() {
        let finance = FinanceService::new();
        let tenant = Uuid::new_v4();
        let late = finance.create_invoice(tenant, consulting(20.0)).await.unwrap();
        let settled = finance.create_invoice(tenant, consulting(20.0)).await.unwrap();
        let draft = finance.create_invoice(tenant, consulting(20.0)).await.unwrap();

        finance
            .update_invoice_status(tenant, status(late.id, InvoiceStatus::Sent))
            .await
            .unwrap();
        finance
            .update_invoice_status(tenant, status(settled.id, InvoiceStatus::Paid))
            .await
            .unwrap();

        let flagged = finance.mark_overdue(tenant, date(2024, 6, 15)).await.unwrap();
        assert_eq!(flagged, 1);
        assert_eq!(finance.mark_overdue(tenant, date(2024, 6, 15)).await.unwrap(), 0);

        let approved = finance
            .submit_expense(
                tenant,
                NewExpense {
                    category: "Travel".into(),
                    description: "Train tickets".into(),
                    amount_cents: 22_814,
                    incurred_on: date(2024, 5, 3),
                },
            )
            .await
            .unwrap();
        finance
            .update_expense_status(
                tenant,
                StatusChange {
                    id: approved.id,
                    status: ExpenseStatus::Approved,
                },
            )
            .await
            .unwrap();
        finance
            .submit_expense(
                tenant,
                NewExpense {
                    category: "Software".into(),
                    description: "Licences".into(),
                    amount_cents: 5_000,
                    incurred_on: date(2024, 5, 4),
                },
            )
            .await
            .unwrap();

        let metrics = finance.metrics(tenant).await;
        assert_eq!(metrics.revenue_cents, 122_814);
        assert_eq!(metrics.tax_collected_cents, 20_469);
        assert_eq!(metrics.outstanding_cents, 122_814);
        assert_eq!(metrics.overdue_invoices, 1);
        assert_eq!(metrics.approved_expenses_cents, 22_814);
        assert_eq!(metrics.pending_expenses, 1);
        assert_eq!(metrics.net_income_cents, 100_000);
        assert_eq!(
            finance
                .invoices(
                    tenant,
                    &InvoiceFilter {
                        status: Some(InvoiceStatus::Draft),
                        customer: Some("globex".into()),
                    },
                )
                .await[0]
                .id,
            draft.id
        );
    }
}
