//! ReconciliationEngine - Turns verified provider reports into ledger transitions.
//!
//! Every inbound channel funnels into [`ReconciliationEngine::reconcile`]:
//!
//! 1. The provider adapter verifies the signal, bounded by a timeout
//! 2. The payment is located by the signal's correlation key
//! 3. A reported amount (or store product) is checked against the ledger
//! 4. A terminal payment is left alone (`NoOp`)
//! 5. The transition out of PENDING is a compare-and-set in storage
//! 6. The winner of a transition into SUCCESS activates the package
//!
//! Rejections never mutate anything. Storage failures are returned as errors
//! so channels can answer with a code that makes the provider retry.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::{ErrorCode, Timestamp};
use crate::domain::payment::{
    reported_amount_matches, ActivationReport, ExchangeRate, InboundSignal, Payment,
    PaymentError, PaymentStatus, ProviderKind, ReconcileOutcome, RejectReason, VerifiedOutcome,
};
use crate::ports::{PaymentRepository, TransitionResult};

use super::{ActivatePackageHandler, ProviderRegistry};

/// Upper bound on a single adapter verification.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ReconciliationEngine {
    repository: Arc<dyn PaymentRepository>,
    providers: ProviderRegistry,
    activation: ActivatePackageHandler,
    exchange_rate: ExchangeRate,
    verify_timeout: Duration,
}

impl ReconciliationEngine {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        providers: ProviderRegistry,
        activation: ActivatePackageHandler,
        exchange_rate: ExchangeRate,
    ) -> Self {
        Self {
            repository,
            providers,
            activation,
            exchange_rate,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Reconciles one inbound signal for `provider`.
    ///
    /// # Errors
    ///
    /// - `ProviderNotConfigured` if no adapter is registered for `provider`
    /// - `Infrastructure` if the ledger could not be read or written
    pub async fn reconcile(
        &self,
        provider: ProviderKind,
        signal: InboundSignal,
    ) -> Result<ReconcileOutcome, PaymentError> {
        if signal.provider() != provider {
            return Ok(self.reject(provider, &signal, RejectReason::MalformedSignal, None));
        }

        let adapter = self
            .providers
            .get(provider)
            .ok_or(PaymentError::ProviderNotConfigured(provider))?;

        let verified = match tokio::time::timeout(self.verify_timeout, adapter.verify_inbound(&signal)).await {
            Ok(Ok(verified)) => verified,
            Ok(Err(e)) => {
                tracing::debug!(provider = %provider, error = %e, "Signal verification failed");
                return Ok(self.reject(provider, &signal, e.reject_reason(), None));
            }
            Err(_) => {
                return Ok(self.reject(provider, &signal, RejectReason::Timeout, None));
            }
        };

        let payment = match self
            .repository
            .find_by_correlation(provider, &verified.correlation_key)
            .await?
        {
            Some(payment) => payment,
            None => {
                tracing::warn!(
                    provider = %provider,
                    channel = signal.channel(),
                    key = %verified.correlation_key,
                    reason = %RejectReason::PaymentNotFound,
                    "Signal rejected"
                );
                return Ok(ReconcileOutcome::Rejected(RejectReason::PaymentNotFound));
            }
        };

        if let Some(reported) = &verified.reported_amount {
            if !reported_amount_matches(payment.amount, reported, &self.exchange_rate) {
                tracing::warn!(
                    payment_code = %payment.code,
                    expected_vnd = payment.amount,
                    reported = reported.value,
                    currency = ?reported.currency,
                    "Reported amount does not match ledger"
                );
                return Ok(self.reject(
                    provider,
                    &signal,
                    RejectReason::AmountMismatch,
                    Some(&payment),
                ));
            }
        }

        if let Some(product) = verified.correlation_patch.product_id.as_deref() {
            if payment.correlation.product_id.as_deref() != Some(product) {
                tracing::warn!(
                    payment_code = %payment.code,
                    expected_product = payment.correlation.product_id.as_deref(),
                    reported_product = product,
                    "Purchased product does not match payment"
                );
                return Ok(self.reject(
                    provider,
                    &signal,
                    RejectReason::AmountMismatch,
                    Some(&payment),
                ));
            }
        }

        if payment.is_terminal() {
            tracing::info!(
                payment_code = %payment.code,
                status = %payment.status,
                channel = signal.channel(),
                "Payment already settled"
            );
            return Ok(ReconcileOutcome::NoOp(payment.status));
        }

        self.settle(provider, &signal, &payment, &verified).await
    }

    async fn settle(
        &self,
        provider: ProviderKind,
        signal: &InboundSignal,
        payment: &Payment,
        verified: &VerifiedOutcome,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let channel = signal.channel();
        let target = verified.outcome.status();
        let result = match self
            .repository
            .try_transition(&payment.id, target, &verified.correlation_patch, Timestamp::now())
            .await
        {
            Ok(result) => result,
            Err(e) if e.code == ErrorCode::PurchaseTokenReused => {
                return Ok(self.reject(
                    provider,
                    signal,
                    RejectReason::InvalidSignature,
                    Some(payment),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let settled = match result {
            TransitionResult::Transitioned(settled) => settled,
            TransitionResult::AlreadyTerminal(winner) => {
                tracing::info!(
                    payment_code = %payment.code,
                    status = %winner,
                    channel,
                    "Lost settlement race"
                );
                return Ok(ReconcileOutcome::NoOp(winner));
            }
        };

        tracing::info!(
            payment_code = %settled.code,
            provider = %settled.provider,
            status = %settled.status,
            channel,
            "Payment settled"
        );

        let activation = if settled.status == PaymentStatus::Success {
            self.activation.activate(&settled).await
        } else {
            ActivationReport::NotRequired
        };

        Ok(ReconcileOutcome::Applied {
            payment: settled,
            activation,
        })
    }

    fn reject(
        &self,
        provider: ProviderKind,
        signal: &InboundSignal,
        reason: RejectReason,
        payment: Option<&Payment>,
    ) -> ReconcileOutcome {
        tracing::warn!(
            provider = %provider,
            channel = signal.channel(),
            payment_code = payment.map(|p| p.code.as_str()),
            reason = %reason,
            "Signal rejected"
        );
        ReconcileOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryPackageActivator, InMemoryPackageCatalog, InMemoryPaymentRepository,
    };
    use crate::domain::foundation::{DomainError, PackageId, PaymentId, UserId};
    use crate::domain::payment::{
        CorrelationFields, CorrelationKey, PaymentCode, ProviderOutcome, ReportedAmount,
    };
    use crate::domain::subscription::Package;
    use crate::ports::{CheckoutContext, CheckoutSession, ProviderAdapter, ProviderError};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    /// Adapter that answers every signal with a queued result.
    struct ScriptedAdapter {
        kind: ProviderKind,
        results: Mutex<Vec<Result<VerifiedOutcome, ProviderError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedAdapter {
        fn new(kind: ProviderKind) -> Self {
            Self {
                kind,
                results: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn answering(self, result: Result<VerifiedOutcome, ProviderError>) -> Self {
            self.results.lock().unwrap().push(result);
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn create_checkout(
            &self,
            _payment: &Payment,
            _context: &CheckoutContext,
        ) -> Result<CheckoutSession, ProviderError> {
            Err(ProviderError::unavailable("not used"))
        }

        async fn verify_inbound(&self, _signal: &InboundSignal) -> Result<VerifiedOutcome, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Err(ProviderError::unavailable("no scripted result")))
            }
        }
    }

    /// Repository whose every call fails, simulating a database outage.
    struct FailingRepository;

    #[async_trait]
    impl PaymentRepository for FailingRepository {
        async fn insert(&self, _payment: &Payment) -> Result<(), DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn find_by_id(&self, _id: &PaymentId) -> Result<Option<Payment>, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn find_by_code(&self, _code: &PaymentCode) -> Result<Option<Payment>, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn find_by_correlation(
            &self,
            _provider: ProviderKind,
            _key: &CorrelationKey,
        ) -> Result<Option<Payment>, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn try_transition(
            &self,
            _id: &PaymentId,
            _to: PaymentStatus,
            _patch: &CorrelationFields,
            _at: Timestamp,
        ) -> Result<TransitionResult, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn patch_correlation(
            &self,
            _id: &PaymentId,
            _patch: &CorrelationFields,
        ) -> Result<bool, DomainError> {
            Err(DomainError::database("connection refused"))
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Helpers
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        repo: InMemoryPaymentRepository,
        activator: InMemoryPackageActivator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                repo: InMemoryPaymentRepository::new(),
                activator: InMemoryPackageActivator::new(),
            }
        }

        fn engine(&self, adapter: ScriptedAdapter) -> ReconciliationEngine {
            self.engine_with(Arc::new(self.repo.clone()), adapter)
        }

        fn engine_with(
            &self,
            repository: Arc<dyn PaymentRepository>,
            adapter: ScriptedAdapter,
        ) -> ReconciliationEngine {
            let catalog = InMemoryPackageCatalog::with_packages([Package::new(
                PackageId::new("pkg-monthly").unwrap(),
                "Premium Monthly",
                99_000,
                30,
                vec![],
            )
            .unwrap()]);
            ReconciliationEngine::new(
                repository,
                ProviderRegistry::new().with(Arc::new(adapter)),
                ActivatePackageHandler::new(Arc::new(catalog), Arc::new(self.activator.clone())),
                ExchangeRate::default(),
            )
        }

        async fn pending(&self, provider: ProviderKind) -> Payment {
            let payment = Payment::new_pending(
                PaymentId::new(),
                UserId::new("user-1").unwrap(),
                PackageId::new("pkg-monthly").unwrap(),
                provider,
                99_000,
            )
            .unwrap();
            self.repo.insert(&payment).await.unwrap();
            payment
        }

        /// A pending in-app payment whose checkout recorded `product`.
        async fn pending_iap(&self, product: &str) -> Payment {
            let mut payment = Payment::new_pending(
                PaymentId::new(),
                UserId::new("user-1").unwrap(),
                PackageId::new("pkg-monthly").unwrap(),
                ProviderKind::Iap,
                99_000,
            )
            .unwrap();
            payment.correlation.product_id = Some(product.to_string());
            self.repo.insert(&payment).await.unwrap();
            payment
        }
    }

    fn purchase_verified(payment: &Payment, product: &str, token: &str) -> VerifiedOutcome {
        VerifiedOutcome {
            correlation_key: CorrelationKey::PaymentCode(payment.code.clone()),
            outcome: ProviderOutcome::Success,
            reported_amount: None,
            correlation_patch: CorrelationFields {
                purchase_token: Some(token.to_string()),
                product_id: Some(product.to_string()),
                ..Default::default()
            },
        }
    }

    fn purchase_signal(payment: &Payment) -> InboundSignal {
        InboundSignal::InAppPurchase {
            payment_code: payment.code.to_string(),
            product_id: "ignored_by_scripted_adapter".to_string(),
            purchase_token: "ignored".to_string(),
        }
    }

    fn verified(payment: &Payment, outcome: ProviderOutcome, amount: Option<ReportedAmount>) -> VerifiedOutcome {
        VerifiedOutcome {
            correlation_key: CorrelationKey::PaymentCode(payment.code.clone()),
            outcome,
            reported_amount: amount,
            correlation_patch: CorrelationFields {
                transaction_no: Some("14226112".to_string()),
                ..Default::default()
            },
        }
    }

    fn ipn() -> InboundSignal {
        InboundSignal::RedirectIpn {
            params: BTreeMap::new(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn success_settles_and_activates() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&payment, ProviderOutcome::Success, Some(ReportedAmount::vnd(99_000.0))),
        )));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        let ReconcileOutcome::Applied { payment: settled, activation } = outcome else {
            panic!("expected Applied");
        };
        assert_eq!(settled.status, PaymentStatus::Success);
        assert_eq!(settled.correlation.transaction_no.as_deref(), Some("14226112"));
        assert!(matches!(activation, ActivationReport::Activated { .. }));
        assert_eq!(fx.activator.activation_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_signal_is_noop_and_activates_once() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&payment, ProviderOutcome::Success, None),
        )));

        engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();
        let second = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(second, ReconcileOutcome::NoOp(PaymentStatus::Success));
        assert_eq!(fx.activator.activation_count(), 1);
    }

    #[tokio::test]
    async fn failure_after_success_does_not_downgrade() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(
            ScriptedAdapter::new(ProviderKind::RedirectIpn)
                .answering(Ok(verified(&payment, ProviderOutcome::Success, None)))
                .answering(Ok(verified(&payment, ProviderOutcome::Failed, None))),
        );

        engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();
        let late = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(late, ReconcileOutcome::NoOp(PaymentStatus::Success));
        let stored = fx.repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn canceled_payment_needs_no_activation() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&payment, ProviderOutcome::Canceled, None),
        )));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Applied { activation: ActivationReport::NotRequired, .. }
        ));
        assert_eq!(outcome.status(), Some(PaymentStatus::Canceled));
        assert_eq!(fx.activator.activation_count(), 0);
    }

    #[tokio::test]
    async fn amount_mismatch_rejects_without_mutation() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&payment, ProviderOutcome::Success, Some(ReportedAmount::vnd(1.0))),
        )));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::AmountMismatch));
        let stored = fx.repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(fx.activator.activation_count(), 0);
    }

    #[tokio::test]
    async fn cheaper_store_product_is_rejected() {
        let fx = Fixture::new();
        let payment = fx.pending_iap("premium_lifetime").await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::Iap).answering(Ok(
            purchase_verified(&payment, "cheap_coin_pack", "token-1"),
        )));

        let outcome = engine
            .reconcile(ProviderKind::Iap, purchase_signal(&payment))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::AmountMismatch));
        let stored = fx.repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(fx.activator.activation_count(), 0);
    }

    #[tokio::test]
    async fn purchase_token_settles_one_payment_only() {
        let fx = Fixture::new();
        let first = fx.pending_iap("premium_monthly").await;
        let second = fx.pending_iap("premium_monthly").await;
        let engine = fx.engine(
            ScriptedAdapter::new(ProviderKind::Iap)
                .answering(Ok(purchase_verified(&first, "premium_monthly", "token-1")))
                .answering(Ok(purchase_verified(&second, "premium_monthly", "token-1"))),
        );

        let applied = engine
            .reconcile(ProviderKind::Iap, purchase_signal(&first))
            .await
            .unwrap();
        let replayed = engine
            .reconcile(ProviderKind::Iap, purchase_signal(&second))
            .await
            .unwrap();

        assert_eq!(applied.status(), Some(PaymentStatus::Success));
        assert_eq!(replayed, ReconcileOutcome::Rejected(RejectReason::InvalidSignature));
        let stored = fx.repo.find_by_id(&second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(fx.activator.activation_count(), 1);
    }

    #[tokio::test]
    async fn usd_amount_checked_at_configured_rate() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::OauthRest).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::OauthRest).answering(Ok(
            verified(&payment, ProviderOutcome::Success, Some(ReportedAmount::usd(3.96))),
        )));

        let outcome = engine
            .reconcile(
                ProviderKind::OauthRest,
                InboundSignal::OAuthCapture {
                    order_id: "5O190127TN364715T".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.status(), Some(PaymentStatus::Success));
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected() {
        let fx = Fixture::new();
        fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(
            ScriptedAdapter::new(ProviderKind::RedirectIpn)
                .answering(Err(ProviderError::invalid_signature("checksum mismatch"))),
        );

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::InvalidSignature));
    }

    #[tokio::test]
    async fn unknown_payment_is_rejected() {
        let fx = Fixture::new();
        let stranger = Payment::new_pending(
            PaymentId::new(),
            UserId::new("user-2").unwrap(),
            PackageId::new("pkg-monthly").unwrap(),
            ProviderKind::RedirectIpn,
            99_000,
        )
        .unwrap();
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&stranger, ProviderOutcome::Success, None),
        )));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::PaymentNotFound));
    }

    #[tokio::test]
    async fn payment_of_other_provider_is_not_found() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::HmacCallback).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&payment, ProviderOutcome::Success, None),
        )));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::PaymentNotFound));
    }

    #[tokio::test]
    async fn signal_for_other_channel_is_malformed() {
        let fx = Fixture::new();
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn));

        let outcome = engine
            .reconcile(
                ProviderKind::RedirectIpn,
                InboundSignal::HmacCallback {
                    body: "{}".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::MalformedSignal));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_an_error() {
        let fx = Fixture::new();
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn));

        let err = engine
            .reconcile(
                ProviderKind::HmacCallback,
                InboundSignal::HmacCallback {
                    body: "{}".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err, PaymentError::ProviderNotConfigured(ProviderKind::HmacCallback));
    }

    #[tokio::test]
    async fn slow_verification_times_out() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx
            .engine(
                ScriptedAdapter::new(ProviderKind::RedirectIpn)
                    .answering(Ok(verified(&payment, ProviderOutcome::Success, None)))
                    .slow(Duration::from_secs(5)),
            )
            .with_verify_timeout(Duration::from_millis(20));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::Timeout));
        let stored = fx.repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn storage_outage_is_returned_as_error() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine_with(
            Arc::new(FailingRepository),
            ScriptedAdapter::new(ProviderKind::RedirectIpn)
                .answering(Ok(verified(&payment, ProviderOutcome::Success, None))),
        );

        let err = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap_err();

        assert!(matches!(err, PaymentError::Infrastructure(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn activation_failure_keeps_payment_successful() {
        let fx = Fixture::new();
        fx.activator.set_unavailable(true);
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let engine = fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(Ok(
            verified(&payment, ProviderOutcome::Success, None),
        )));

        let outcome = engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Applied { activation: ActivationReport::Failed { .. }, .. }
        ));
        let stored = fx.repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn concurrent_signals_settle_once() {
        let fx = Fixture::new();
        let payment = fx.pending(ProviderKind::RedirectIpn).await;
        let success = Arc::new(fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(
            Ok(verified(&payment, ProviderOutcome::Success, None)),
        )));
        let failure = Arc::new(fx.engine(ScriptedAdapter::new(ProviderKind::RedirectIpn).answering(
            Ok(verified(&payment, ProviderOutcome::Failed, None)),
        )));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let engine = if i % 2 == 0 { success.clone() } else { failure.clone() };
            tasks.push(tokio::spawn(async move {
                engine.reconcile(ProviderKind::RedirectIpn, ipn()).await.unwrap()
            }));
        }
        let outcomes: Vec<ReconcileOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let applied: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o, ReconcileOutcome::Applied { .. }))
            .collect();
        assert_eq!(applied.len(), 1);

        let winner = applied[0].status().unwrap();
        assert!(outcomes.iter().all(|o| o.status() == Some(winner)));

        let stored = fx.repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, winner);
        let expected_activations = usize::from(winner == PaymentStatus::Success);
        assert_eq!(fx.activator.activation_count(), expected_activations);
    }
}
