use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth as auth_dto,
        orders::{OrderDetail, OrderList, SubOrderWithItems},
        payments as payment_dto,
        products as product_dto,
        reports::ReportList,
        shipments as shipment_dto,
        stores::StoreList,
    },
    models::{
        AdminAction, Category, Order, OrderItem, Payment, Product, Report, Shipment, Store,
        SubOrder, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, categories, fulfillment, health, orders, params, payments, products, reports,
        stores,
    },
    status::{
        OrderStatus, PaymentMethod, PaymentStatus, ProductStatus, ReportStatus, ShipmentStatus,
        StoreStatus, UserRole,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        categories::create_category,
        categories::list_categories,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        stores::create_store,
        stores::list_stores,
        stores::get_store,
        stores::update_store,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::record_payment,
        fulfillment::list_sub_orders,
        fulfillment::advance_sub_order,
        fulfillment::create_shipment,
        fulfillment::update_shipment_status,
        payments::update_payment_status,
        reports::file_report,
        reports::list_my_reports,
        admin::record_action,
        admin::list_actions,
        admin::list_users,
        admin::delete_user,
        admin::block_store,
        admin::list_all_orders,
        admin::list_all_reports,
        admin::update_report_status
    ),
    components(
        schemas(
            User,
            Store,
            Category,
            Product,
            Order,
            SubOrder,
            OrderItem,
            Shipment,
            Payment,
            Report,
            AdminAction,
            UserRole,
            StoreStatus,
            ProductStatus,
            OrderStatus,
            ShipmentStatus,
            PaymentStatus,
            PaymentMethod,
            ReportStatus,
            auth_dto::RegisterRequest,
            auth_dto::LoginRequest,
            auth_dto::LoginResponse,
            product_dto::CreateProductRequest,
            product_dto::UpdateProductRequest,
            product_dto::ProductList,
            product_dto::CreateCategoryRequest,
            product_dto::CategoryList,
            StoreList,
            OrderList,
            OrderDetail,
            SubOrderWithItems,
            payment_dto::RecordPaymentRequest,
            payment_dto::UpdatePaymentStatusRequest,
            shipment_dto::CreateShipmentRequest,
            shipment_dto::UpdateShipmentStatusRequest,
            shipment_dto::AdvanceSubOrderRequest,
            shipment_dto::SubOrderList,
            ReportList,
            admin::RecordActionRequest,
            admin::ActionList,
            admin::UserList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::SubOrderListQuery,
            params::ReportListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<StoreList>,
            ApiResponse<ReportList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Stores", description = "Store endpoints"),
        (name = "Orders", description = "Buyer order endpoints"),
        (name = "Fulfillment", description = "Seller sub-order and shipment endpoints"),
        (name = "Payments", description = "Payment endpoints"),
        (name = "Reports", description = "Report endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
