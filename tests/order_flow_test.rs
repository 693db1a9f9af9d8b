mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{response_json, TestApp};
use dinein_api::entities::{dining_table, order, order_item};

fn decimal_of(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected decimal, got {other:?}"),
    }
}

async fn add_cart_item(
    app: &TestApp,
    user: Uuid,
    hotel_id: Uuid,
    table_number: i32,
    name: &str,
    price: &str,
) {
    let response = app
        .request_as(
            user,
            Method::POST,
            "/api/v1/carts/items",
            Some(json!({
                "hotel_id": hotel_id,
                "table_number": table_number,
                "menu_item_id": Uuid::new_v4(),
                "name": name,
                "quantity": 1,
                "price": price,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn fresh_database_boots_through_migrations() {
    // `TestApp::new` applies the full migration set against in-memory SQLite;
    // any schema the backend cannot create fails here, before any endpoint.
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn order_creation_computes_taxes_and_books_table() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 4).await;
    let diner = Uuid::new_v4();

    add_cart_item(&app, diner, hotel.id, 4, "thali", "300").await;

    let response = app
        .request_as(
            diner,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 4,
                "payment_method": "cash",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let data = &body["data"];

    assert_eq!(decimal_of(&data["subtotal"]), dec!(300));
    assert_eq!(decimal_of(&data["cgst_amount"]), dec!(7.5));
    assert_eq!(decimal_of(&data["sgst_amount"]), dec!(7.5));
    assert_eq!(decimal_of(&data["service_charge"]), dec!(15));
    assert_eq!(decimal_of(&data["total_amount"]), dec!(330));
    assert_eq!(data["payment_status"], "pending");

    let order_id: Uuid = data["id"].as_str().unwrap().parse().unwrap();
    let table = dining_table::Entity::find()
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.active_order_id, Some(order_id));

    // The consumed cart is gone.
    let resolve = app
        .request_as(
            diner,
            Method::GET,
            &format!("/api/v1/carts/resolve?hotel_id={}&table_number=4", hotel.id),
            None,
        )
        .await;
    assert_eq!(resolve.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_diner_merges_into_active_order() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 7).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    add_cart_item(&app, first, hotel.id, 7, "thali", "300").await;
    let response = app
        .request_as(
            first,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 7,
                "payment_method": "cash",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first_order = response_json(response).await;
    let first_order_id = first_order["data"]["id"].as_str().unwrap().to_string();

    add_cart_item(&app, second, hotel.id, 7, "lassi", "100").await;
    let response = app
        .request_as(
            second,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 7,
                "payment_method": "cash",
            })),
        )
        .await;
    // Merge, not a second order.
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let data = &body["data"];

    assert_eq!(data["id"].as_str().unwrap(), first_order_id);
    assert_eq!(decimal_of(&data["subtotal"]), dec!(400));
    assert_eq!(decimal_of(&data["cgst_amount"]), dec!(10));
    assert_eq!(decimal_of(&data["sgst_amount"]), dec!(10));
    assert_eq!(decimal_of(&data["service_charge"]), dec!(20));
    assert_eq!(decimal_of(&data["total_amount"]), dec!(440));
    assert_eq!(data["items"].as_array().unwrap().len(), 2);
    assert_eq!(data["users"].as_array().unwrap().len(), 2);

    let order_count = order::Entity::find()
        .all(app.state.db.as_ref())
        .await
        .unwrap()
        .len();
    assert_eq!(order_count, 1);
}

#[tokio::test]
async fn paying_for_items_updates_ledger_proportionally() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 2).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    add_cart_item(&app, first, hotel.id, 2, "thali", "300").await;
    let response = app
        .request_as(
            first,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 2,
                "payment_method": "cash",
            })),
        )
        .await;
    let order_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    add_cart_item(&app, second, hotel.id, 2, "lassi", "100").await;
    app.request_as(
        second,
        Method::POST,
        "/api/v1/orders",
        Some(json!({
            "hotel_id": hotel.id,
            "table_number": 2,
            "payment_method": "cash",
        })),
    )
    .await;

    let body = response_json(
        app.request_as(second, Method::GET, &format!("/api/v1/orders/{order_id}"), None)
            .await,
    )
    .await;
    let lassi_item = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| decimal_of(&item["price"]) == dec!(100))
        .expect("merged item present")["id"]
        .as_str()
        .unwrap()
        .to_string();

    // 100 paid of 400: 100 * 1.05 tax-inclusive + a quarter of the 20
    // service charge = 110.
    let response = app
        .request_as(
            second,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/pay-for-items"),
            Some(json!({
                "item_ids": [lassi_item],
                "payment_method": "cash",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(decimal_of(&body["data"]["amount_paid"]), dec!(110));
    assert_eq!(body["data"]["payment_status"], "partially-paid");

    // Paying the same item again changes nothing to pay.
    let response = app
        .request_as(
            second,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/pay-for-items"),
            Some(json!({
                "item_ids": [lassi_item],
                "payment_method": "cash",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn outsider_cannot_pay_for_order_items() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 9).await;
    let diner = Uuid::new_v4();
    let outsider = Uuid::new_v4();

    add_cart_item(&app, diner, hotel.id, 9, "thali", "300").await;
    let body = response_json(
        app.request_as(
            diner,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 9,
                "payment_method": "cash",
            })),
        )
        .await,
    )
    .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request_as(
            outsider,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/pay-for-items"),
            Some(json!({
                "item_ids": [item_id],
                "payment_method": "cash",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn completion_requires_full_payment_and_frees_table() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 5).await;
    let diner = Uuid::new_v4();

    add_cart_item(&app, diner, hotel.id, 5, "thali", "300").await;
    let body = response_json(
        app.request_as(
            diner,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 5,
                "payment_method": "cash",
            })),
        )
        .await,
    )
    .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    // Not paid yet.
    let response = app
        .request_as(
            diner,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/complete"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request_as(
            diner,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/pay-for-items"),
            Some(json!({
                "item_ids": [item_id],
                "payment_method": "cash",
            })),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(decimal_of(&body["data"]["amount_paid"]), dec!(330));
    assert_eq!(body["data"]["payment_status"], "paid");

    let response = app
        .request_as(
            diner,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/complete"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "delivered");

    let table = dining_table::Entity::find()
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.active_order_id, None);
    assert_eq!(table.status, dining_table::TableStatus::Available);
}

#[tokio::test]
async fn online_payment_settles_at_order_time() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 3).await;
    let diner = Uuid::new_v4();

    add_cart_item(&app, diner, hotel.id, 3, "thali", "300").await;
    let body = response_json(
        app.request_as(
            diner,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 3,
                "payment_method": "online",
            })),
        )
        .await,
    )
    .await;

    assert_eq!(decimal_of(&body["data"]["amount_paid"]), dec!(330));
    assert_eq!(body["data"]["payment_status"], "paid");
}

#[tokio::test]
async fn list_orders_reports_filtered_summary() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 1).await;
    app.seed_table(hotel.id, 2).await;
    let diner = Uuid::new_v4();

    for table in [1, 2] {
        add_cart_item(&app, diner, hotel.id, table, "thali", "300").await;
        let response = app
            .request_as(
                diner,
                Method::POST,
                "/api/v1/orders",
                Some(json!({
                    "hotel_id": hotel.id,
                    "table_number": table,
                    "payment_method": "cash",
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let body = response_json(
        app.request_as(diner, Method::GET, "/api/v1/orders?page=1&limit=10", None)
            .await,
    )
    .await;
    let data = &body["data"];
    assert_eq!(data["total"], 2);
    assert_eq!(data["data"]["summary"]["count"], 2);
    assert_eq!(decimal_of(&data["data"]["summary"]["total_amount"]), dec!(660));

    let body = response_json(
        app.request_as(
            diner,
            Method::GET,
            "/api/v1/orders?page=1&limit=10&table_number=1",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["data"]["summary"]["count"], 1);
}

#[tokio::test]
async fn deleted_order_reads_as_absent() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 6).await;
    let diner = Uuid::new_v4();

    add_cart_item(&app, diner, hotel.id, 6, "thali", "300").await;
    let body = response_json(
        app.request_as(
            diner,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 6,
                "payment_method": "cash",
            })),
        )
        .await,
    )
    .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request_as(diner, Method::DELETE, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request_as(diner, Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The table slot is free again.
    let table = dining_table::Entity::find()
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.active_order_id, None);
}

#[tokio::test]
async fn concurrent_order_creation_yields_single_order() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 8).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    add_cart_item(&app, first, hotel.id, 8, "thali", "300").await;
    add_cart_item(&app, second, hotel.id, 8, "lassi", "100").await;

    let cart = response_json(
        app.request_as(
            first,
            Method::GET,
            &format!("/api/v1/carts/resolve?hotel_id={}&table_number=8", hotel.id),
            None,
        )
        .await,
    )
    .await;
    let item_with_price = |price: Decimal| -> String {
        cart["data"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|item| decimal_of(&item["price"]) == price)
            .expect("cart item present")["id"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let thali = item_with_price(dec!(300));
    let lassi = item_with_price(dec!(100));

    // Both diners submit at once, each consuming only their own item. One
    // claims the table and creates; the other loses the claim and merges.
    let (first_response, second_response) = tokio::join!(
        app.request_as(
            first,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 8,
                "payment_method": "cash",
                "selected_item_ids": [thali],
            })),
        ),
        app.request_as(
            second,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 8,
                "payment_method": "cash",
                "selected_item_ids": [lassi],
            })),
        ),
    );
    let mut statuses = [first_response.status(), second_response.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CREATED]);

    let orders = order::Entity::find()
        .all(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].subtotal, dec!(400));
    assert_eq!(orders[0].total_amount, dec!(440));
    assert_eq!(orders[0].user_ids().len(), 2);

    let items = order_item::Entity::find()
        .all(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(items.len(), 2);

    let table = dining_table::Entity::find()
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.active_order_id, Some(orders[0].id));
}

#[tokio::test]
async fn sequential_item_payments_accumulate_in_ledger() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 11).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    add_cart_item(&app, first, hotel.id, 11, "thali", "300").await;
    let response = app
        .request_as(
            first,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 11,
                "payment_method": "cash",
            })),
        )
        .await;
    let order_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    add_cart_item(&app, second, hotel.id, 11, "lassi", "100").await;
    app.request_as(
        second,
        Method::POST,
        "/api/v1/orders",
        Some(json!({
            "hotel_id": hotel.id,
            "table_number": 11,
            "payment_method": "cash",
        })),
    )
    .await;

    let body = response_json(
        app.request_as(second, Method::GET, &format!("/api/v1/orders/{order_id}"), None)
            .await,
    )
    .await;
    let item_with_price = |price: Decimal| -> String {
        body["data"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|item| decimal_of(&item["price"]) == price)
            .expect("order item present")["id"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let thali = item_with_price(dec!(300));
    let lassi = item_with_price(dec!(100));

    let response = app
        .request_as(
            second,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/pay-for-items"),
            Some(json!({ "item_ids": [lassi], "payment_method": "cash" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(decimal_of(&body["data"]["amount_paid"]), dec!(110));

    // The second payment's recompute covers the first; every order write
    // bumped the version it was guarded on (create, merge, two payments).
    let response = app
        .request_as(
            first,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/pay-for-items"),
            Some(json!({ "item_ids": [thali], "payment_method": "cash" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(decimal_of(&body["data"]["amount_paid"]), dec!(440));
    assert_eq!(body["data"]["payment_status"], "paid");
    assert_eq!(body["data"]["version"], 4);
}

#[tokio::test]
async fn delivered_order_status_is_frozen() {
    let app = TestApp::new().await;
    let hotel = app.seed_hotel(dec!(2.5), dec!(2.5), dec!(5)).await;
    app.seed_table(hotel.id, 12).await;
    let diner = Uuid::new_v4();

    add_cart_item(&app, diner, hotel.id, 12, "thali", "300").await;
    let body = response_json(
        app.request_as(
            diner,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "hotel_id": hotel.id,
                "table_number": 12,
                "payment_method": "cash",
            })),
        )
        .await,
    )
    .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    app.request_as(
        diner,
        Method::POST,
        &format!("/api/v1/orders/{order_id}/pay-for-items"),
        Some(json!({ "item_ids": [item_id], "payment_method": "cash" })),
    )
    .await;
    let response = app
        .request_as(
            diner,
            Method::POST,
            &format!("/api/v1/orders/{order_id}/complete"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The table was released on delivery; reviving the order would leave it
    // active against a free slot.
    let response = app
        .request_as(
            diner,
            Method::PATCH,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(
        app.request_as(diner, Method::GET, &format!("/api/v1/orders/{order_id}"), None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["status"], "delivered");
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/orders", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
