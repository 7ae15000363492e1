//! End-to-end reconciliation against the in-memory ledger.
//!
//! Signals are built and signed exactly as the gateways would send them and
//! pushed through the real provider adapters and the reconciliation engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use package_billing::adapters::memory::{
    InMemoryPackageActivator, InMemoryPackageCatalog, InMemoryPaymentRepository,
};
use package_billing::adapters::providers::{
    GooglePlayAdapter, VnpayAdapter, VnpayConfig, ZalopayAdapter, ZalopayConfig,
};
use package_billing::application::{
    ActivatePackageHandler, CreateCheckoutCommand, CreateCheckoutHandler, CreatePaymentCommand,
    CreatePaymentHandler, ProviderRegistry, ReconciliationEngine,
};
use package_billing::domain::foundation::{PackageId, UserId};
use package_billing::domain::payment::signature::{
    canonical_query, hmac_sha256_hex, hmac_sha512_hex,
};
use package_billing::domain::payment::{
    ActivationReport, CorrelationFields, ExchangeRate, InboundSignal, Payment, PaymentStatus,
    ProviderKind, ReconcileOutcome, RejectReason,
};
use package_billing::domain::subscription::{Package, SubscriptionPlan};
use package_billing::ports::{
    PaymentRepository, ProductPurchase, ProviderError, PurchaseState, PurchaseValidator,
};

const VNPAY_SECRET: &str = "VNPAYTESTSECRET";
const ZALOPAY_APP_ID: i64 = 2553;
const ZALOPAY_KEY2: &str = "kLtgPl8HHhfvMuDHPwKfgfsY4Ydm9eIz";

// ════════════════════════════════════════════════════════════════════════════
// Harness
// ════════════════════════════════════════════════════════════════════════════

/// Play Store stand-in: purchase tokens issued for one product each.
#[derive(Default)]
struct PlayStore {
    purchases: Mutex<HashMap<String, (String, ProductPurchase)>>,
}

impl PlayStore {
    fn sell(&self, token: &str, product_id: &str, account_id: Option<&str>) {
        self.purchases.lock().unwrap().insert(
            token.to_string(),
            (
                product_id.to_string(),
                ProductPurchase {
                    purchase_state: PurchaseState::Purchased,
                    order_id: Some(format!("GPA.{}", token)),
                    obfuscated_account_id: account_id.map(str::to_string),
                },
            ),
        );
    }
}

#[async_trait]
impl PurchaseValidator for PlayStore {
    async fn validate(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<ProductPurchase, ProviderError> {
        match self.purchases.lock().unwrap().get(purchase_token) {
            Some((product, purchase)) if product == product_id => Ok(purchase.clone()),
            _ => Err(ProviderError::invalid_signature("unknown purchase token")),
        }
    }
}

struct Harness {
    repo: InMemoryPaymentRepository,
    activator: InMemoryPackageActivator,
    store: Arc<PlayStore>,
    create: CreatePaymentHandler,
    checkout: CreateCheckoutHandler,
    engine: Arc<ReconciliationEngine>,
}

impl Harness {
    fn new() -> Self {
        let repo = InMemoryPaymentRepository::new();
        let activator = InMemoryPackageActivator::new();
        let catalog = Arc::new(InMemoryPackageCatalog::with_packages([
            package("pkg-monthly", 99_000, 30),
            package("pkg-lifetime", 990_000, 0),
            package("pkg-45", 150_000, 45),
            package("pkg-coins", 10_000, 30).with_store_product_id("cheap_coin_pack"),
            package("pkg-premium-lifetime", 990_000, 0).with_store_product_id("premium_lifetime"),
        ]));
        let store = Arc::new(PlayStore::default());
        let repository: Arc<dyn PaymentRepository> = Arc::new(repo.clone());

        let providers = ProviderRegistry::new()
            .with(Arc::new(VnpayAdapter::new(VnpayConfig::new(
                "TESTTMN1",
                VNPAY_SECRET,
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
                "https://billing.example.com/payments/vnpay/return",
            ))))
            .with(Arc::new(ZalopayAdapter::new(ZalopayConfig::new(
                ZALOPAY_APP_ID,
                "PcY4iZIKFCIdgZvA6ueMcMHHUbRLYjPL",
                ZALOPAY_KEY2,
                "http://127.0.0.1:9/v2/create",
                "https://billing.example.com/payments/zalopay/callback",
                "https://app.example.com/payment-result",
            ))))
            .with(Arc::new(GooglePlayAdapter::new(store.clone())));

        let engine = ReconciliationEngine::new(
            repository.clone(),
            providers.clone(),
            ActivatePackageHandler::new(catalog.clone(), Arc::new(activator.clone())),
            ExchangeRate::default(),
        );

        Self {
            repo,
            activator,
            store,
            create: CreatePaymentHandler::new(repository.clone(), catalog.clone()),
            checkout: CreateCheckoutHandler::new(
                repository.clone(),
                CreatePaymentHandler::new(repository, catalog),
                providers,
            ),
            engine: Arc::new(engine),
        }
    }

    async fn iap_checkout(&self, user_id: &str, package_id: &str) -> Payment {
        self.checkout
            .handle(CreateCheckoutCommand {
                user_id: UserId::new(user_id).unwrap(),
                package_id: PackageId::new(package_id).unwrap(),
                provider: ProviderKind::Iap,
                client_ip: "203.0.113.7".to_string(),
                locale: None,
                bank_code: None,
            })
            .await
            .unwrap()
            .payment
    }

    async fn redeem(&self, payment: &Payment, product_id: &str, token: &str) -> ReconcileOutcome {
        self.engine
            .reconcile(
                ProviderKind::Iap,
                InboundSignal::InAppPurchase {
                    payment_code: payment.code.to_string(),
                    product_id: product_id.to_string(),
                    purchase_token: token.to_string(),
                },
            )
            .await
            .unwrap()
    }

    async fn create(&self, package_id: &str, provider: ProviderKind) -> Payment {
        self.create
            .handle(CreatePaymentCommand {
                user_id: UserId::new("user-1").unwrap(),
                package_id: PackageId::new(package_id).unwrap(),
                provider,
            })
            .await
            .unwrap()
            .payment
    }

    async fn stored(&self, payment: &Payment) -> Payment {
        self.repo.find_by_id(&payment.id).await.unwrap().unwrap()
    }

    async fn ipn(&self, params: BTreeMap<String, String>) -> ReconcileOutcome {
        self.engine
            .reconcile(ProviderKind::RedirectIpn, InboundSignal::RedirectIpn { params })
            .await
            .unwrap()
    }
}

fn package(id: &str, price: i64, duration_days: u32) -> Package {
    Package::new(PackageId::new(id).unwrap(), id, price, duration_days, vec![]).unwrap()
}

/// IPN query parameters for `payment`, signed with the merchant secret.
fn signed_ipn(payment: &Payment, amount_vnd: i64, response_code: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut put = |k: &str, v: String| {
        params.insert(k.to_string(), v);
    };
    put("vnp_Amount", (amount_vnd * 100).to_string());
    put("vnp_BankCode", "NCB".to_string());
    put("vnp_OrderInfo", format!("Thanh toan goi {}", payment.code));
    put("vnp_PayDate", "20240115103000".to_string());
    put("vnp_ResponseCode", response_code.to_string());
    put("vnp_TmnCode", "TESTTMN1".to_string());
    put("vnp_TransactionNo", "14226112".to_string());
    put("vnp_TransactionStatus", response_code.to_string());
    put("vnp_TxnRef", payment.code.to_string());

    let hash = hmac_sha512_hex(
        VNPAY_SECRET.as_bytes(),
        canonical_query(&params, "vnp_", &[]).as_bytes(),
    );
    params.insert("vnp_SecureHash".to_string(), hash);
    params
}

fn zalopay_callback(app_trans_id: &str, amount: i64, key: &str) -> InboundSignal {
    let data = serde_json::json!({
        "app_id": ZALOPAY_APP_ID,
        "app_trans_id": app_trans_id,
        "app_time": 1705311000000_i64,
        "app_user": "user-1",
        "amount": amount,
        "embed_data": "{}",
        "item": "[]",
        "zp_trans_id": 240115000001_i64,
        "server_time": 1705311060000_i64,
        "channel": 38,
        "merchant_user_id": "",
        "user_fee_amount": 0,
        "discount_amount": 0
    })
    .to_string();
    let body = serde_json::json!({
        "data": data,
        "mac": hmac_sha256_hex(key.as_bytes(), data.as_bytes()),
        "type": 1
    })
    .to_string();
    InboundSignal::HmacCallback { body }
}

// ════════════════════════════════════════════════════════════════════════════
// Redirect/IPN flow
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn signed_ipn_settles_payment_and_activates_package() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;
    assert_eq!(payment.amount, 99_000);
    assert_eq!(payment.status, PaymentStatus::Pending);

    let outcome = h.ipn(signed_ipn(&payment, 99_000, "00")).await;

    let ReconcileOutcome::Applied { payment: settled, activation } = outcome else {
        panic!("expected Applied");
    };
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(settled.correlation.transaction_no.as_deref(), Some("14226112"));

    let ActivationReport::Activated { window } = activation else {
        panic!("expected activation");
    };
    assert_eq!(window.plan, SubscriptionPlan::Monthly);
    assert_eq!(window.starts_at, settled.updated_at);
    assert_eq!(window.ends_at, Some(settled.updated_at.add_days(30)));

    let subscription = h.activator.subscription_of(&payment.user_id).await.unwrap();
    assert_eq!(subscription.package_id.as_str(), "pkg-monthly");
}

#[tokio::test]
async fn duplicate_ipn_is_noop_with_single_activation() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;
    let params = signed_ipn(&payment, 99_000, "00");

    h.ipn(params.clone()).await;
    let second = h.ipn(params).await;

    assert_eq!(second, ReconcileOutcome::NoOp(PaymentStatus::Success));
    assert_eq!(h.activator.activation_count(), 1);
}

#[tokio::test]
async fn amount_tampering_is_rejected_despite_valid_signature() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;

    let outcome = h.ipn(signed_ipn(&payment, 1, "00")).await;

    assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::AmountMismatch));
    assert_eq!(h.stored(&payment).await.status, PaymentStatus::Pending);
    assert_eq!(h.activator.activation_count(), 0);
}

#[tokio::test]
async fn altered_parameter_breaks_signature() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;
    let mut params = signed_ipn(&payment, 99_000, "00");
    params.insert("vnp_ResponseCode".to_string(), "24".to_string());

    let outcome = h.ipn(params).await;

    assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::InvalidSignature));
    assert_eq!(h.stored(&payment).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn late_failure_cannot_overwrite_success() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;

    h.ipn(signed_ipn(&payment, 99_000, "00")).await;
    let late = h.ipn(signed_ipn(&payment, 99_000, "51")).await;

    assert_eq!(late, ReconcileOutcome::NoOp(PaymentStatus::Success));
    assert_eq!(h.stored(&payment).await.status, PaymentStatus::Success);
}

#[tokio::test]
async fn customer_cancel_settles_without_activation() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;

    let outcome = h.ipn(signed_ipn(&payment, 99_000, "24")).await;

    assert_eq!(outcome.status(), Some(PaymentStatus::Canceled));
    assert_eq!(h.activator.activation_count(), 0);
}

// ════════════════════════════════════════════════════════════════════════════
// Subscription windows
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn zero_day_package_is_lifetime() {
    let h = Harness::new();
    let payment = h.create("pkg-lifetime", ProviderKind::RedirectIpn).await;

    let outcome = h.ipn(signed_ipn(&payment, 990_000, "00")).await;

    let ReconcileOutcome::Applied {
        activation: ActivationReport::Activated { window },
        ..
    } = outcome
    else {
        panic!("expected activation");
    };
    assert_eq!(window.plan, SubscriptionPlan::Lifetime);
    assert!(window.ends_at.is_none());
}

#[tokio::test]
async fn forty_five_day_package_is_custom() {
    let h = Harness::new();
    let payment = h.create("pkg-45", ProviderKind::RedirectIpn).await;

    let outcome = h.ipn(signed_ipn(&payment, 150_000, "00")).await;

    let ReconcileOutcome::Applied {
        activation: ActivationReport::Activated { window },
        ..
    } = outcome
    else {
        panic!("expected activation");
    };
    assert_eq!(window.plan, SubscriptionPlan::Custom);
    assert_eq!(window.ends_at, Some(window.starts_at.add_days(45)));
}

// ════════════════════════════════════════════════════════════════════════════
// HMAC callback flow
// ════════════════════════════════════════════════════════════════════════════

async fn zalopay_payment(h: &Harness) -> (Payment, String) {
    let payment = h.create("pkg-monthly", ProviderKind::HmacCallback).await;
    let app_trans_id = format!("240115_{}", payment.code);
    let patched = h
        .repo
        .patch_correlation(
            &payment.id,
            &CorrelationFields {
                app_trans_id: Some(app_trans_id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(patched);
    (payment, app_trans_id)
}

#[tokio::test]
async fn zalopay_callback_settles_by_app_trans_id() {
    let h = Harness::new();
    let (payment, app_trans_id) = zalopay_payment(&h).await;

    let outcome = h
        .engine
        .reconcile(
            ProviderKind::HmacCallback,
            zalopay_callback(&app_trans_id, 99_000, ZALOPAY_KEY2),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), Some(PaymentStatus::Success));
    let stored = h.stored(&payment).await;
    assert_eq!(stored.correlation.provider_trans_id.as_deref(), Some("240115000001"));
    assert_eq!(h.activator.activation_count(), 1);
}

#[tokio::test]
async fn zalopay_callback_with_wrong_key_is_rejected() {
    let h = Harness::new();
    let (payment, app_trans_id) = zalopay_payment(&h).await;

    let outcome = h
        .engine
        .reconcile(
            ProviderKind::HmacCallback,
            zalopay_callback(&app_trans_id, 99_000, "not-the-merchant-key"),
        )
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::InvalidSignature));
    assert_eq!(h.stored(&payment).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn signal_cannot_settle_payment_of_another_provider() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::HmacCallback).await;

    let outcome = h.ipn(signed_ipn(&payment, 99_000, "00")).await;

    assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::PaymentNotFound));
}

// ════════════════════════════════════════════════════════════════════════════
// Concurrency
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_success_and_failure_have_one_winner() {
    let h = Harness::new();
    let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;
    let success = signed_ipn(&payment, 99_000, "00");
    let failure = signed_ipn(&payment, 99_000, "51");

    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = h.engine.clone();
        let params = if i % 2 == 0 { success.clone() } else { failure.clone() };
        tasks.push(tokio::spawn(async move {
            engine
                .reconcile(ProviderKind::RedirectIpn, InboundSignal::RedirectIpn { params })
                .await
                .unwrap()
        }));
    }
    let outcomes: Vec<ReconcileOutcome> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<&ReconcileOutcome> = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Applied { .. }))
        .collect();
    assert_eq!(winners.len(), 1);

    let final_status = h.stored(&payment).await.status;
    assert_eq!(winners[0].status(), Some(final_status));
    for outcome in &outcomes {
        assert_eq!(outcome.status(), Some(final_status));
    }

    let expected = usize::from(final_status == PaymentStatus::Success);
    assert_eq!(h.activator.activation_count(), expected);
}

// ════════════════════════════════════════════════════════════════════════════
// In-app purchase flow
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn bound_purchase_settles_its_payment() {
    let h = Harness::new();
    let payment = h.iap_checkout("user-1", "pkg-premium-lifetime").await;
    assert_eq!(payment.correlation.product_id.as_deref(), Some("premium_lifetime"));
    h.store.sell("token-life", "premium_lifetime", Some(payment.code.as_str()));

    let outcome = h.redeem(&payment, "premium_lifetime", "token-life").await;

    assert_eq!(outcome.status(), Some(PaymentStatus::Success));
    let stored = h.stored(&payment).await;
    assert_eq!(stored.correlation.purchase_token.as_deref(), Some("token-life"));
    assert_eq!(h.activator.activation_count(), 1);
}

#[tokio::test]
async fn one_cheap_purchase_cannot_settle_other_payments() {
    let h = Harness::new();
    let coins = h.iap_checkout("buyer", "pkg-coins").await;
    h.store.sell("token-coins", "cheap_coin_pack", Some(coins.code.as_str()));
    h.store.sell("token-unbound", "cheap_coin_pack", None);

    let mut targets = Vec::new();
    for user in ["user-a", "user-b", "user-c"] {
        targets.push(h.iap_checkout(user, "pkg-premium-lifetime").await);
    }

    for target in &targets {
        for token in ["token-coins", "token-unbound"] {
            let outcome = h.redeem(target, "cheap_coin_pack", token).await;
            assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::InvalidSignature));
        }
    }

    // The purchase still settles the payment it was made for.
    let own = h.redeem(&coins, "cheap_coin_pack", "token-coins").await;
    assert_eq!(own.status(), Some(PaymentStatus::Success));

    for target in &targets {
        assert_eq!(h.stored(target).await.status, PaymentStatus::Pending);
    }
    assert_eq!(h.activator.activation_count(), 1);
}

#[tokio::test]
async fn purchase_of_other_product_is_amount_mismatch() {
    let h = Harness::new();
    let payment = h.iap_checkout("user-1", "pkg-premium-lifetime").await;
    h.store.sell("token-cheap", "cheap_coin_pack", Some(payment.code.as_str()));

    let outcome = h.redeem(&payment, "cheap_coin_pack", "token-cheap").await;

    assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::AmountMismatch));
    assert_eq!(h.stored(&payment).await.status, PaymentStatus::Pending);
    assert_eq!(h.activator.activation_count(), 0);
}

#[tokio::test]
async fn payment_codes_are_unique() {
    let h = Harness::new();
    let mut codes = std::collections::HashSet::new();

    for _ in 0..100 {
        let payment = h.create("pkg-monthly", ProviderKind::RedirectIpn).await;
        assert!(codes.insert(payment.code));
    }
    assert_eq!(h.repo.len().await, 100);
}
