//! Storefront layers against a live service: client, optimistic cart and checkout.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use testresult::TestResult;
use tilestore::api::{router, AppState};
use tilestore::checkout::{Checkout, CheckoutError};
use tilestore::client::{ClientError, StorefrontClient};
use tilestore::domain::aggregates::{
    Coupon, CouponDraft, DiscountType, ListKind, NewLine, OrderStatus, Owner, PaymentMethod, Product, ProductDraft,
    ShippingInfo, Variant,
};
use tilestore::domain::value_objects::CouponCode;
use tilestore::store::Store;
use tilestore::sync::{ItemCache, SyncError};
use tilestore::{ListQuery, PricingPolicy};

const ADMIN: &str = "e2e-admin";

async fn serve() -> TestResult<String> {
    let state = AppState::new(Store::in_memory(Duration::hours(72)), PricingPolicy::default())
        .with_admin_token(Some(ADMIN.to_string()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router(state)).await });
    Ok(format!("http://{addr}/api/v1"))
}

fn slab_draft(stock: u32) -> ProductDraft {
    ProductDraft {
        name: "Statuario Marble Slab".into(), sku: "STM-1200".into(), description: String::new(), brand: None,
        category: None, price: Decimal::from(1000), mrp: None, stock, variants: Vec::new(), images: Vec::new(),
        is_active: true,
    }
}

fn line(product: &Product, quantity: u32) -> NewLine {
    NewLine {
        product_id: product.id.clone(), variant: Variant::default(), name: product.name.clone(), price: product.price,
        image: None, quantity,
    }
}

fn shipping() -> ShippingInfo {
    ShippingInfo {
        full_name: "Asha Rao".into(), phone: "9800000000".into(), address: "12 MG Road".into(),
        city: "Bengaluru".into(), state: "Karnataka".into(), pincode: "560001".into(), country: "India".into(),
    }
}

#[tokio::test]
async fn checkout_end_to_end() -> TestResult {
    let base = serve().await?;
    let admin = StorefrontClient::new(&base).with_token(ADMIN);
    let shopper = Arc::new(StorefrontClient::new(&base).with_user("u1"));
    assert_eq!(shopper.health().await?["status"], "healthy");

    let product: Product = admin.create::<Product, _>(&slab_draft(10)).await?;
    let owner = Owner::User("u1".into());
    let cart = Arc::new(ItemCache::new(shopper.clone()));
    let checkout = Checkout::new(shopper.clone(), cart.clone(), PricingPolicy::default());

    let added = cart.add(ListKind::Cart, &owner, line(&product, 2)).await?;
    assert!(!added.id.is_temporary());
    let quote = checkout.quote(&owner)?;
    assert_eq!(
        (quote.items_price, quote.tax_price, quote.shipping_price, quote.total_amount),
        (Decimal::from(2000), Decimal::from(360), Decimal::from(200), Decimal::from(2560)),
    );

    let order = checkout.place_order(&owner, shipping(), PaymentMethod::Cod, None).await?;
    assert_eq!(order.total_price, Decimal::from(2560));
    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(cart.snapshot(ListKind::Cart, &owner).is_empty());
    assert!(shopper.items(ListKind::Cart, &owner).await?.is_empty());

    assert_eq!(shopper.order(&order.id).await?.id, order.id);
    assert_eq!(shopper.my_orders(&ListQuery::default()).await?.total, 1);
    assert_eq!(admin.get::<Product>(&product.id).await?.stock, 8);

    let updated = admin.update_order_status(&order.id, OrderStatus::Confirmed, Some("COD verified".into())).await?;
    assert_eq!(updated.order.history().len(), 2);
    assert!(matches!(
        admin.update_order_status(&order.id, OrderStatus::Pending, None).await,
        Err(ClientError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn coupon_applies_through_checkout() -> TestResult {
    let base = serve().await?;
    let admin = StorefrontClient::new(&base).with_token(ADMIN);
    let shopper = Arc::new(StorefrontClient::new(&base).with_user("u2"));
    let product: Product = admin.create::<Product, _>(&slab_draft(10)).await?;
    let coupon: Coupon = admin
        .create::<Coupon, _>(&CouponDraft {
            code: CouponCode::new("welcome20")?, description: None, discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(20), min_purchase_amount: Decimal::from(1000),
            max_discount_amount: Some(Decimal::from(500)), usage_limit: None, per_user_limit: None,
            expiry_date: Utc::now() + Duration::days(7), is_active: true,
        })
        .await?;
    assert_eq!(coupon.code.as_str(), "WELCOME20");

    let owner = Owner::User("u2".into());
    let cart = Arc::new(ItemCache::new(shopper.clone()));
    let checkout = Checkout::new(shopper.clone(), cart.clone(), PricingPolicy::default());
    cart.add(ListKind::Cart, &owner, line(&product, 1)).await?;

    let quote = checkout.apply_coupon(&owner, "WELCOME20").await?;
    assert_eq!(quote.order_amount, Decimal::from(1380));
    assert_eq!(quote.discount, Decimal::from(276));

    cart.add(ListKind::Cart, &owner, line(&product, 1)).await?;
    let stale = checkout.place_order(&owner, shipping(), PaymentMethod::Cod, Some(&quote)).await;
    assert!(matches!(stale, Err(CheckoutError::StaleCoupon)));

    let quote = checkout.apply_coupon(&owner, "WELCOME20").await?;
    let order = checkout.place_order(&owner, shipping(), PaymentMethod::Upi { upi_id: "asha@okaxis".into() }, Some(&quote)).await?;
    assert_eq!(order.total_price, Decimal::from(2060));
    assert_eq!(order.discount_amount, Decimal::from(500));
    assert_eq!(admin.get::<Coupon>("WELCOME20").await?.usage_count, 1);
    Ok(())
}

#[tokio::test]
async fn rejected_update_rolls_back() -> TestResult {
    let base = serve().await?;
    let shopper = Arc::new(StorefrontClient::new(&base));
    let owner = Owner::Session("tab-1".into());
    let cart = ItemCache::new(shopper.clone());
    let product = Product::create("P-LOCAL", slab_draft(1), Utc::now())?;

    let kept = cart.add(ListKind::Wishlist, &owner, line(&product, 1)).await?;
    let before = cart.snapshot(ListKind::Wishlist, &owner);

    let result = cart.add(ListKind::Wishlist, &owner, line(&product, 1000)).await;
    assert!(matches!(result, Err(SyncError::Remote(ClientError::Validation(_)))), "{result:?}");
    assert_eq!(cart.snapshot(ListKind::Wishlist, &owner), before);

    let moved = cart.move_to_cart(&owner, &kept.id).await?;
    assert_eq!(moved.quantity, 1);
    assert!(shopper.items(ListKind::Wishlist, &owner).await?.is_empty());
    assert_eq!(cart.load(ListKind::Cart, &owner).await?.len(), 1);
    Ok(())
}
