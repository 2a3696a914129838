use axum::http::StatusCode;
use chrono::{Duration, Utc};
use erp_tests::TestApp;
use platform_authn::Role;
use serde_json::json;

#[tokio::test]
async fn employee_lifecycle_over_http() {
    let app = TestApp::new();
    let token = app.token(Role::Admin);

    let created = app
        .post(
            "/api/hr",
            json!({
                "action": "createEmployee",
                "name": "Grace Hopper",
                "email": "Grace@Example.com",
                "department": "Engineering",
                "position": "Compiler engineer",
                "salaryCents": 9_000_000,
                "hireDate": "2023-02-01",
            }),
            Some(&token),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["status"], "ACTIVE");
    assert_eq!(created.body["email"], "grace@example.com");
    let id = created.body["id"].as_str().unwrap().to_string();

    let listed = app
        .get("/api/hr?action=listEmployees&department=Engineering", Some(&token))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let metrics = app.get("/api/hr?action=metrics", Some(&token)).await;
    assert_eq!(metrics.body["totalEmployees"], 1);
    assert_eq!(metrics.body["headcountByDepartment"]["Engineering"], 1);

    let delete = json!({ "action": "deleteEmployee", "id": id });
    assert_eq!(
        app.post("/api/hr", delete.clone(), Some(&token)).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.post("/api/hr", delete, Some(&token)).await.status,
        StatusCode::NOT_FOUND
    );
    let listed = app.get("/api/hr?action=listEmployees", Some(&token)).await;
    assert_eq!(listed.body, json!([]));
}

#[tokio::test]
async fn stock_cannot_go_negative() {
    let app = TestApp::new();
    let token = app.token(Role::Member);
    let product = app
        .post(
            "/api/inventory",
            json!({
                "action": "createProduct",
                "sku": "gear-12",
                "name": "Gear 12T",
                "category": "Drivetrain",
                "unitCostCents": 450,
                "quantity": 10,
                "reorderLevel": 4,
            }),
            Some(&token),
        )
        .await;
    assert_eq!(product.status, StatusCode::CREATED);
    assert_eq!(product.body["sku"], "GEAR-12");
    let id = product.body["id"].clone();

    let issue = |quantity: i64| {
        json!({
            "action": "recordMovement",
            "productId": id,
            "kind": "ISSUE",
            "quantity": quantity,
        })
    };
    let res = app.post("/api/inventory", issue(7), Some(&token)).await;
    assert_eq!(res.status, StatusCode::CREATED);
    let res = app.post("/api/inventory", issue(7), Some(&token)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let low = app
        .get("/api/inventory?action=listLowStock", Some(&token))
        .await;
    assert_eq!(low.body.as_array().unwrap().len(), 1);
    let metrics = app.get("/api/inventory?action=metrics", Some(&token)).await;
    assert_eq!(metrics.body["totalUnits"], 3);
    assert_eq!(metrics.body["stockValueCents"], 1_350);
}

#[tokio::test]
async fn depreciation_is_queryable() {
    let app = TestApp::new();
    let member = app.token(Role::Member);
    let admin = app.token(Role::Admin);
    let asset = app
        .post(
            "/api/assets",
            json!({
                "action": "registerAsset",
                "name": "Forklift",
                "category": "Vehicles",
                "purchaseDate": "2020-01-01",
                "costCents": 1_000_000,
                "salvageValueCents": 0,
                "usefulLifeYears": 4,
                "method": "STRAIGHT_LINE",
            }),
            Some(&member),
        )
        .await;
    assert_eq!(asset.status, StatusCode::CREATED);
    let id = asset.body["id"].as_str().unwrap().to_string();

    let schedule = app
        .get(
            &format!("/api/assets?action=depreciationSchedule&id={id}"),
            Some(&member),
        )
        .await;
    assert_eq!(schedule.status, StatusCode::OK);
    assert_eq!(schedule.body["rows"].as_array().unwrap().len(), 4);
    assert_eq!(schedule.body["rows"][0]["depreciationCents"], 250_000);

    let value = app
        .get(
            &format!("/api/assets?action=bookValue&id={id}&asOf=2022-06-30"),
            Some(&member),
        )
        .await;
    assert_eq!(value.body["bookValueCents"], 500_000);

    let metrics = app
        .get("/api/assets?action=metrics&asOf=2021-01-01", Some(&member))
        .await;
    assert_eq!(metrics.body["accumulatedDepreciationCents"], 250_000);

    let dispose = json!({ "action": "disposeAsset", "id": id });
    assert_eq!(
        app.post("/api/assets", dispose.clone(), Some(&member)).await.status,
        StatusCode::FORBIDDEN
    );
    let disposed = app.post("/api/assets", dispose, Some(&admin)).await;
    assert_eq!(disposed.status, StatusCode::OK);
    assert_eq!(disposed.body["status"], "DISPOSED");
}

#[tokio::test]
async fn shipments_are_tracked_by_number() {
    let app = TestApp::new();
    let token = app.token(Role::Member);
    let today = Utc::now().date_naive();
    let shipment = app
        .post(
            "/api/logistics",
            json!({
                "action": "createShipment",
                "origin": "Hamburg",
                "destination": "Milan",
                "carrier": "Alpfreight",
                "weightKg": 250.5,
                "costCents": 42_000,
                "shipDate": today,
                "estimatedDelivery": today + Duration::days(2),
            }),
            Some(&token),
        )
        .await;
    assert_eq!(shipment.status, StatusCode::CREATED);
    let number = shipment.body["trackingNumber"].as_str().unwrap().to_string();

    let tracked = app
        .get(
            &format!("/api/logistics?action=trackShipment&trackingNumber={number}"),
            Some(&token),
        )
        .await;
    assert_eq!(tracked.status, StatusCode::OK);
    assert_eq!(tracked.body["id"], shipment.body["id"]);

    let missing = app
        .get(
            "/api/logistics?action=trackShipment&trackingNumber=TRK0000000000",
            Some(&token),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overdue_invoices_are_swept() {
    let app = TestApp::new();
    let token = app.token(Role::Member);
    let today = Utc::now().date_naive();
    let invoice = app
        .post(
            "/api/finance",
            json!({
                "action": "createInvoice",
                "customer": "Initech",
                "lines": [{ "description": "Support", "quantity": 3, "unitPriceCents": 10_000 }],
                "taxRate": 10.0,
                "issueDate": today - Duration::days(30),
                "dueDate": today - Duration::days(1),
            }),
            Some(&token),
        )
        .await;
    assert_eq!(invoice.status, StatusCode::CREATED);
    assert_eq!(invoice.body["totalCents"], 33_000);
    let id = invoice.body["id"].clone();

    app.post(
        "/api/finance",
        json!({ "action": "updateInvoiceStatus", "id": id, "status": "SENT" }),
        Some(&token),
    )
    .await;
    let sweep = app
        .post("/api/finance", json!({ "action": "markOverdue" }), Some(&token))
        .await;
    assert_eq!(sweep.status, StatusCode::OK);
    assert_eq!(sweep.body["flagged"], 1);

    let overdue = app
        .get("/api/finance?action=listInvoices&status=OVERDUE", Some(&token))
        .await;
    assert_eq!(overdue.body.as_array().unwrap().len(), 1);
    let metrics = app.get("/api/finance?action=metrics", Some(&token)).await;
    assert_eq!(metrics.body["outstandingCents"], 33_000);
    assert_eq!(metrics.body["overdueInvoices"], 1);
}

#[tokio::test]
async fn survey_summary_over_http() {
    let app = TestApp::new();
    let token = app.token(Role::Member);
    let survey = app
        .post(
            "/api/surveys",
            json!({ "action": "createSurvey", "title": "Office move" }),
            Some(&token),
        )
        .await;
    let id = survey.body["id"].clone();

    let respond = json!({ "action": "submitResponse", "surveyId": id, "rating": 5 });
    let res = app.post("/api/surveys", respond.clone(), Some(&token)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    app.post(
        "/api/surveys",
        json!({ "action": "updateSurveyStatus", "id": id, "status": "ACTIVE" }),
        Some(&token),
    )
    .await;
    assert_eq!(
        app.post("/api/surveys", respond, Some(&token)).await.status,
        StatusCode::CREATED
    );

    let summary = app
        .get(
            &format!(
                "/api/surveys?action=surveySummary&id={}",
                id.as_str().unwrap()
            ),
            Some(&token),
        )
        .await;
    assert_eq!(summary.status, StatusCode::OK);
    assert_eq!(summary.body["responseCount"], 1);
    assert_eq!(summary.body["positive"], 100.0);
}

#[tokio::test]
async fn demo_seed_populates_every_module() {
    let app = TestApp::new();
    server::seed::demo(&app.modules, app.company).await.unwrap();
    let token = app.token(Role::Viewer);

    let hr = app.get("/api/hr?action=metrics", Some(&token)).await;
    assert_eq!(hr.body["totalEmployees"], 4);
    let finance = app.get("/api/finance?action=metrics", Some(&token)).await;
    assert_eq!(finance.body["overdueInvoices"], 1);
    let compliance = app.get("/api/compliance?action=metrics", Some(&token)).await;
    assert_eq!(compliance.body["overallScore"], 50.0);
    let maintenance = app.get("/api/maintenance?action=metrics", Some(&token)).await;
    assert_eq!(maintenance.body["underMaintenance"], 1);

    let other = app.token_for(uuid::Uuid::new_v4(), Role::Viewer);
    let empty = app.get("/api/hr?action=metrics", Some(&other)).await;
    assert_eq!(empty.body["totalEmployees"], 0);
}
