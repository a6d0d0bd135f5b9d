//! HTTP surface: router, handlers, identity extraction and error mapping.
//!
//! Handlers are thin: role check, storage/service call, schema mapping.
//! Every operation has exactly one handler; all state comes in through
//! `AppState`, constructed at startup.

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use http::{StatusCode, header::HeaderValue, request::Parts};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};

use common::config::Config;

use crate::assignment;
use crate::cart::CartSchema;
use crate::db_model::{DbDish, NewDish};
use crate::error::DeliveryError;
use crate::eta::EtaSettings;
use crate::geocode::Geocoder;
use crate::model::{GenericError, ModelId, OrderSchema, OrderStatusSchema, Principal, Role};
use crate::storage::DeliveryStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeliveryStore>,
    pub geocoder: Arc<dyn Geocoder>,
    pub eta: EtaSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn DeliveryStore>, geocoder: Arc<dyn Geocoder>, eta: EtaSettings) -> Self {
        Self {
            store,
            geocoder,
            eta,
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn required_header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, DeliveryError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| DeliveryError::forbidden(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| DeliveryError::validation(format!("malformed {} header", name)))
}

// The auth service in front of this one terminates credentials and passes
// the verified principal along as headers; the claims are trusted here.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = DeliveryError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = required_header(parts, "x-user-id")?
            .parse::<ModelId>()
            .map_err(|_| DeliveryError::validation("malformed x-user-id header"))?;
        let role = required_header(parts, "x-user-role")?
            .parse::<Role>()
            .map_err(|_| DeliveryError::validation("unknown role in x-user-role header"))?;
        let is_active = parts
            .headers
            .get("x-user-active")
            .map(|value| value.as_bytes() != b"false")
            .unwrap_or(true);

        if !is_active {
            return Err(DeliveryError::forbidden("account is deactivated"));
        }
        Ok(Principal {
            id,
            role,
            is_active,
        })
    }
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn list_dishes(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<Vec<DbDish>>, DeliveryError> {
    Ok(Json(state.store.list_dishes().await?))
}

pub async fn create_dish(
    State(state): State<AppState>,
    principal: Principal,
    Json(dish): Json<NewDish>,
) -> Result<Json<DbDish>, DeliveryError> {
    principal.require(Role::Admin)?;
    Ok(Json(state.store.create_dish(dish).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddDishRequest {
    pub dish_id: ModelId,
    pub quantity: i32,
}

pub async fn add_dish_to_cart(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<AddDishRequest>,
) -> Result<Json<CartSchema>, DeliveryError> {
    principal.require(Role::Customer)?;
    let lines = state
        .store
        .add_dish_to_cart(principal.id, request.dish_id, request.quantity)
        .await?;
    Ok(Json(CartSchema::from_lines(principal.id, lines)))
}

pub async fn get_cart(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<CartSchema>, DeliveryError> {
    principal.require(Role::Customer)?;
    let lines = state.store.cart_lines(principal.id).await?;
    Ok(Json(CartSchema::from_lines(principal.id, lines)))
}

pub async fn create_order(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<OrderSchema>, DeliveryError> {
    principal.require(Role::Customer)?;
    let order = state.store.checkout(principal.id).await?;
    counter!("orders_created_total").increment(1);
    Ok(Json(OrderSchema::from(order)))
}

pub async fn not_delivered_orders(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<OrderStatusSchema>>, DeliveryError> {
    principal.require(Role::Courier)?;
    let orders = state.store.list_claimable_orders().await?;
    Ok(Json(orders.iter().map(OrderStatusSchema::from).collect()))
}

pub async fn my_orders(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<OrderSchema>>, DeliveryError> {
    principal.require(Role::Courier)?;
    let orders = state.store.list_courier_orders(principal.id).await?;
    Ok(Json(orders.into_iter().map(OrderSchema::from).collect()))
}

#[derive(Debug, Default, Deserialize)]
pub struct TakeOrderRequest {
    #[serde(default)]
    pub location: Option<String>,
}

pub async fn take_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<ModelId>,
    Json(request): Json<TakeOrderRequest>,
) -> Result<Json<OrderSchema>, DeliveryError> {
    principal.require(Role::Courier)?;
    let order = assignment::take_order(
        state.store.as_ref(),
        state.geocoder.as_ref(),
        &state.eta,
        order_id,
        principal.id,
        request.location.as_deref(),
    )
    .await?;
    Ok(Json(OrderSchema::from(order)))
}

pub async fn deliver_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<ModelId>,
) -> Result<Json<OrderSchema>, DeliveryError> {
    principal.require(Role::Courier)?;
    let order = state.store.mark_delivered(order_id, principal.id).await?;
    counter!("orders_delivered_total").increment(1);
    Ok(Json(OrderSchema::from(order)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub location: String,
}

pub async fn update_courier_location(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<StatusCode, DeliveryError> {
    principal.require(Role::Courier)?;
    state
        .store
        .update_courier_location(principal.id, &request.location)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn prepare_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<ModelId>,
) -> Result<Json<OrderStatusSchema>, DeliveryError> {
    principal.require(Role::KitchenWorker)?;
    let order = state.store.mark_prepared(order_id, principal.id).await?;
    Ok(Json(OrderStatusSchema::from(&order)))
}

pub async fn not_ready_orders(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<OrderStatusSchema>>, DeliveryError> {
    principal.require(Role::KitchenWorker)?;
    let orders = state.store.list_unprepared_orders().await?;
    Ok(Json(orders.iter().map(OrderStatusSchema::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct AddBalanceRequest {
    pub amount: f64,
}

pub async fn add_balance(
    State(state): State<AppState>,
    principal: Principal,
    Path(customer_id): Path<ModelId>,
    Json(request): Json<AddBalanceRequest>,
) -> Result<Json<serde_json::Value>, DeliveryError> {
    let allowed = principal.role == Role::Admin
        || (principal.role == Role::Customer && principal.id == customer_id);
    if !allowed {
        return Err(DeliveryError::forbidden(
            "you may only top up your own balance",
        ));
    }
    let balance = state.store.add_balance(customer_id, request.amount).await?;
    Ok(Json(json!({ "customer_id": customer_id, "balance": balance })))
}

pub async fn all_orders(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<OrderSchema>>, DeliveryError> {
    principal.require(Role::Admin)?;
    let orders = state.store.list_all_orders().await?;
    Ok(Json(orders.into_iter().map(OrderSchema::from).collect()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/dishes", get(list_dishes).post(create_dish))
        .route("/cart", get(get_cart))
        .route("/cart/add-dish", post(add_dish_to_cart))
        .route("/cart/create-order", post(create_order))
        .route("/courier/orders/not_delivered", get(not_delivered_orders))
        .route("/courier/orders/mine", get(my_orders))
        .route("/courier/location", put(update_courier_location))
        .route("/courier/{order_id}/take", put(take_order))
        .route("/courier/{order_id}/deliver", put(deliver_order))
        .route("/kitchen_worker/orders/not_ready", get(not_ready_orders))
        .route("/kitchen_worker/{order_id}/prepare", put(prepare_order))
        .route("/users/{id}/balance", post(add_balance))
        .route("/admin/orders", get(all_orders))
        .with_state(state)
}

pub async fn run_backend(config: &Config, state: AppState) -> Result<(), GenericError> {
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let cors = match &config.backend.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = router(state)
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("starting backend service at {}", config.backend.server_address);
    let listener = tokio::net::TcpListener::bind(&config.backend.server_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
