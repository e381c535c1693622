//! Database-backed engine tests
//!
//! These run against a real Postgres named by DATABASE_URL and are ignored by
//! default:
//!
//!   DATABASE_URL=postgres://localhost/reserva_test cargo test -- --ignored

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use reserva_backend::clock::{SharedClock, SystemClock};
use reserva_backend::config::RefundPolicyConfig;
use reserva_backend::database::no_show_queue_repository::NoShowQueueRepository;
use reserva_backend::database::payment_repository::PaymentRepository;
use reserva_backend::database::refund_audit_repository::RefundAuditRepository;
use reserva_backend::database::reservation_repository::{
    ReservationRepository, ReservationStatus,
};
use reserva_backend::error::ErrorCode;
use reserva_backend::payments::error::{GatewayError, GatewayResult};
use reserva_backend::payments::gateway::PaymentGateway;
use reserva_backend::payments::types::{
    CancelAck, CancelPaymentRequest, CheckoutSession, CustomerContact, InitializePaymentRequest,
    PaymentStage,
};
use reserva_backend::services::notification::{spawn_dispatcher, LoggingNotificationService};
use reserva_backend::services::payment_orchestrator::{
    FinalPaymentTrigger, PaymentOrchestrator,
};
use reserva_backend::services::refund_policy::CancellationType;
use reserva_backend::services::refund_processor::{
    RefundProcessor, RefundRequest, RefundStatus,
};

struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> GatewayResult<CheckoutSession> {
        request.validate()?;
        Ok(CheckoutSession {
            payment_id: format!("pay_{}", Uuid::new_v4().simple()),
            payment_key: format!("key_{}", Uuid::new_v4().simple()),
            order_id: format!("order_{}", request.reservation_id),
            checkout_url: "https://checkout.test/session".to_string(),
            amount: request.amount,
            stage: request.stage,
        })
    }

    async fn cancel_payment(&self, request: CancelPaymentRequest) -> GatewayResult<CancelAck> {
        Ok(CancelAck {
            transaction_id: None,
            cancelled_amount: request.amount,
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct UnreachableGateway;

#[async_trait]
impl PaymentGateway for UnreachableGateway {
    async fn initialize_payment(
        &self,
        _request: InitializePaymentRequest,
    ) -> GatewayResult<CheckoutSession> {
        Err(GatewayError::NetworkError {
            message: "connection refused".to_string(),
        })
    }

    async fn cancel_payment(&self, _request: CancelPaymentRequest) -> GatewayResult<CancelAck> {
        Err(GatewayError::NetworkError {
            message: "connection refused".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPool::connect(&url).await.expect("connect to test database");
    setup_schema(&pool).await;
    pool
}

async fn setup_schema(pool: &PgPool) {
    let ddl = [
        "CREATE TABLE IF NOT EXISTS reservations (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            shop_id UUID NOT NULL,
            status TEXT NOT NULL,
            reservation_date DATE NOT NULL,
            reservation_time TIME NOT NULL,
            total_amount BIGINT NOT NULL,
            deposit_amount BIGINT,
            remaining_amount BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        "CREATE TABLE IF NOT EXISTS payments (
            id UUID PRIMARY KEY,
            reservation_id UUID NOT NULL,
            user_id UUID NOT NULL,
            payment_stage TEXT NOT NULL,
            payment_status TEXT NOT NULL,
            amount BIGINT NOT NULL,
            is_deposit BOOLEAN NOT NULL,
            due_date TIMESTAMPTZ,
            gateway_payment_key TEXT,
            metadata JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            paid_at TIMESTAMPTZ
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS payments_one_pending_per_stage
            ON payments (reservation_id, payment_stage)
            WHERE payment_status IN ('deposit_pending', 'final_payment_pending')",
        "CREATE TABLE IF NOT EXISTS refund_audit_log (
            id UUID PRIMARY KEY,
            reservation_id UUID NOT NULL,
            user_id UUID NOT NULL,
            cancellation_type TEXT NOT NULL,
            refund_percentage SMALLINT NOT NULL,
            original_amount BIGINT NOT NULL,
            refund_amount BIGINT NOT NULL,
            cancellation_window TEXT NOT NULL,
            reason TEXT NOT NULL,
            applied_policies JSONB NOT NULL,
            decided_at_civil TEXT NOT NULL,
            reservation_at_civil TEXT NOT NULL,
            timezone TEXT NOT NULL,
            gateway_transaction_id TEXT,
            succeeded BOOLEAN NOT NULL,
            failure_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        "CREATE TABLE IF NOT EXISTS no_show_refund_queue (
            id UUID PRIMARY KEY,
            reservation_id UUID NOT NULL UNIQUE,
            user_id UUID NOT NULL,
            status TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            scheduled_at TIMESTAMPTZ NOT NULL,
            last_error TEXT,
            refund_audit_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    ];
    for statement in ddl {
        sqlx::query(statement).execute(pool).await.expect("schema setup");
    }
}

async fn insert_reservation(pool: &PgPool, status: &str, total: i64) -> (Uuid, Uuid) {
    let id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO reservations
             (id, user_id, shop_id, status, reservation_date, reservation_time, total_amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(user_id)
    .bind(Uuid::new_v4())
    .bind(status)
    .bind(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    .bind(chrono::NaiveTime::from_hms_opt(14, 0, 0).unwrap())
    .bind(total)
    .execute(pool)
    .await
    .expect("insert reservation");
    (id, user_id)
}

fn orchestrator(pool: &PgPool) -> PaymentOrchestrator {
    orchestrator_with(pool, Arc::new(StubGateway))
}

fn orchestrator_with(pool: &PgPool, gateway: Arc<dyn PaymentGateway>) -> PaymentOrchestrator {
    let clock: SharedClock = Arc::new(SystemClock);
    let (notifications, _handle) = spawn_dispatcher(Arc::new(LoggingNotificationService));
    PaymentOrchestrator::new(
        pool.clone(),
        Arc::new(ReservationRepository::new(pool.clone())),
        Arc::new(PaymentRepository::new(pool.clone())),
        gateway,
        clock,
        notifications,
    )
}

fn refund_processor(pool: &PgPool) -> RefundProcessor {
    RefundProcessor::new(
        Arc::new(ReservationRepository::new(pool.clone())),
        Arc::new(PaymentRepository::new(pool.clone())),
        Arc::new(RefundAuditRepository::new(pool.clone())),
        Arc::new(StubGateway),
        Arc::new(SystemClock),
        RefundPolicyConfig::default(),
    )
}

async fn insert_paid_deposit(pool: &PgPool, reservation_id: Uuid, user_id: Uuid, amount: i64) {
    sqlx::query(
        "INSERT INTO payments
             (id, reservation_id, user_id, payment_stage, payment_status,
              amount, is_deposit, gateway_payment_key, metadata, paid_at)
         VALUES ($1, $2, $3, 'deposit', 'deposit_paid', $4, TRUE, $5, '{}', NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(reservation_id)
    .bind(user_id)
    .bind(amount)
    .bind(format!("key_{}", Uuid::new_v4().simple()))
    .execute(pool)
    .await
    .expect("insert paid deposit");
}

async fn set_amounts(pool: &PgPool, reservation_id: Uuid, deposit: i64, remaining: i64) {
    sqlx::query(
        "UPDATE reservations SET deposit_amount = $2, remaining_amount = $3 WHERE id = $1",
    )
    .bind(reservation_id)
    .bind(deposit)
    .bind(remaining)
    .execute(pool)
    .await
    .expect("set amounts");
}

async fn queue_status(pool: &PgPool, reservation_id: Uuid) -> String {
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM no_show_refund_queue WHERE reservation_id = $1")
            .bind(reservation_id)
            .fetch_one(pool)
            .await
            .expect("queue row exists");
    status
}

#[tokio::test]
#[ignore]
async fn deposit_inside_the_band_is_accepted_and_splits_the_total() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "requested", 100_000).await;
    let svc = orchestrator(&pool);

    let session = svc
        .prepare_deposit_payment(reservation_id, user_id, 25_000, CustomerContact::default())
        .await
        .expect("25% deposit should be accepted");
    assert_eq!(session.amount, 25_000);
    assert_eq!(session.stage, PaymentStage::Deposit);

    let reservations = ReservationRepository::new(pool.clone());
    let row = reservations
        .find_by_id(reservation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.deposit_amount, Some(25_000));
    assert_eq!(row.remaining_amount, Some(75_000));
}

#[tokio::test]
#[ignore]
async fn deposit_outside_the_band_is_rejected() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "requested", 100_000).await;
    let svc = orchestrator(&pool);

    let err = svc
        .prepare_deposit_payment(reservation_id, user_id, 40_000, CustomerContact::default())
        .await
        .expect_err("40% deposit must be rejected");
    assert_eq!(err.error_code(), ErrorCode::InvalidDepositAmount);
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
#[ignore]
async fn second_pending_deposit_is_a_conflict() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "requested", 100_000).await;
    let svc = orchestrator(&pool);

    svc.prepare_deposit_payment(reservation_id, user_id, 25_000, CustomerContact::default())
        .await
        .expect("first deposit prepares");
    let err = svc
        .prepare_deposit_payment(reservation_id, user_id, 30_000, CustomerContact::default())
        .await
        .expect_err("second deposit must conflict");
    assert_eq!(err.error_code(), ErrorCode::DuplicatePendingPayment);

    // The loser must not overwrite the winner's persisted split
    let row = ReservationRepository::new(pool.clone())
        .find_by_id(reservation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.deposit_amount, Some(25_000));
    assert_eq!(row.remaining_amount, Some(75_000));
}

#[tokio::test]
#[ignore]
async fn gateway_failure_leaves_no_partial_deposit_state() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "requested", 100_000).await;
    let svc = orchestrator_with(&pool, Arc::new(UnreachableGateway));

    svc.prepare_deposit_payment(reservation_id, user_id, 25_000, CustomerContact::default())
        .await
        .expect_err("gateway is down");

    let row = ReservationRepository::new(pool.clone())
        .find_by_id(reservation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.deposit_amount, None);
    assert_eq!(row.remaining_amount, None);
    let payments = PaymentRepository::new(pool.clone())
        .find_by_stage(reservation_id, PaymentStage::Deposit)
        .await
        .unwrap();
    assert!(payments.is_empty());
}

#[tokio::test]
#[ignore]
async fn final_checkout_covers_the_remaining_balance() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "completed", 100_000).await;
    set_amounts(&pool, reservation_id, 25_000, 75_000).await;
    insert_paid_deposit(&pool, reservation_id, user_id, 25_000).await;
    let svc = orchestrator(&pool);

    let session = svc
        .prepare_final_payment(reservation_id, user_id, CustomerContact::default())
        .await
        .expect("final checkout prepares");
    assert_eq!(session.amount, 75_000);
    assert_eq!(session.stage, PaymentStage::Final);

    let err = svc
        .prepare_final_payment(reservation_id, user_id, CustomerContact::default())
        .await
        .expect_err("second final checkout must conflict");
    assert_eq!(err.error_code(), ErrorCode::DuplicatePendingPayment);
}

#[tokio::test]
#[ignore]
async fn final_checkout_requires_completed_service() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "confirmed", 100_000).await;
    set_amounts(&pool, reservation_id, 25_000, 75_000).await;
    insert_paid_deposit(&pool, reservation_id, user_id, 25_000).await;
    let svc = orchestrator(&pool);

    let err = svc
        .prepare_final_payment(reservation_id, user_id, CustomerContact::default())
        .await
        .expect_err("service not yet completed");
    assert_eq!(err.error_code(), ErrorCode::ServiceNotCompleted);
    assert_eq!(err.status_code(), 422);
}

#[tokio::test]
#[ignore]
async fn final_checkout_requires_a_collected_deposit() {
    let pool = connect().await;
    let (reservation_id, user_id) = insert_reservation(&pool, "completed", 100_000).await;
    let svc = orchestrator(&pool);

    let err = svc
        .prepare_final_payment(reservation_id, user_id, CustomerContact::default())
        .await
        .expect_err("deposit was never collected");
    assert_eq!(err.error_code(), ErrorCode::DepositNotPaid);
}

#[tokio::test]
#[ignore]
async fn completion_trigger_is_idempotent() {
    let pool = connect().await;
    let (reservation_id, _user_id) = insert_reservation(&pool, "completed", 100_000).await;
    set_amounts(&pool, reservation_id, 25_000, 75_000).await;
    let svc = orchestrator(&pool);

    let first = svc
        .trigger_final_payment_after_completion(reservation_id)
        .await
        .expect("first trigger");
    assert!(matches!(first, FinalPaymentTrigger::Created(_)));

    let second = svc
        .trigger_final_payment_after_completion(reservation_id)
        .await
        .expect("second trigger");
    assert!(matches!(second, FinalPaymentTrigger::AlreadyExists));

    let payments = PaymentRepository::new(pool.clone());
    let finals = payments
        .find_by_stage(reservation_id, PaymentStage::Final)
        .await
        .unwrap();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].amount, 75_000);
    assert_eq!(finals[0].metadata, json!({ "auto_triggered": true }));
    assert!(finals[0].due_date.is_some());
}

#[tokio::test]
#[ignore]
async fn no_show_flag_loses_to_a_concurrent_completion() {
    let pool = connect().await;
    let (reservation_id, _user_id) = insert_reservation(&pool, "completed", 100_000).await;
    let reservations = ReservationRepository::new(pool.clone());

    // The scan expected `confirmed` but the customer showed up
    let flagged = reservations
        .update_status_checked(
            reservation_id,
            ReservationStatus::Confirmed,
            ReservationStatus::NoShow,
        )
        .await
        .unwrap();
    assert!(flagged.is_none());
}

#[tokio::test]
#[ignore]
async fn exhausted_queue_items_are_skipped_and_stay_skipped() {
    let pool = connect().await;
    let queue = NoShowQueueRepository::new(pool.clone());
    let reservation_id = Uuid::new_v4();

    queue
        .enqueue(reservation_id, Uuid::new_v4(), Utc::now() - Duration::hours(1))
        .await
        .unwrap()
        .expect("fresh reservation enqueues");

    // Three claim/fail rounds exhaust the retry budget. Claims are filtered
    // to this test's reservation; the table is shared with the other tests
    // in a combined run.
    for attempt in 0..3 {
        if attempt > 0 {
            queue
                .requeue_cooled_down(Utc::now() + Duration::hours(1), 3)
                .await
                .unwrap();
            assert_eq!(queue_status(&pool, reservation_id).await, "pending");
        }
        let ours: Vec<_> = queue
            .claim_due(Utc::now(), 50)
            .await
            .unwrap()
            .into_iter()
            .filter(|item| item.reservation_id == reservation_id)
            .collect();
        assert_eq!(ours.len(), 1, "attempt {} should claim the item", attempt);
        queue
            .mark_failed(ours[0].id, "gateway unavailable")
            .await
            .unwrap();
    }

    queue.skip_exhausted(3).await.unwrap();
    assert_eq!(queue_status(&pool, reservation_id).await, "skipped");

    // Skipped items never come back, even past every cooldown
    queue
        .requeue_cooled_down(Utc::now() + Duration::hours(1), 3)
        .await
        .unwrap();
    assert_eq!(queue_status(&pool, reservation_id).await, "skipped");
    let ours: Vec<_> = queue
        .claim_due(Utc::now(), 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|item| item.reservation_id == reservation_id)
        .collect();
    assert!(ours.is_empty());
}

#[tokio::test]
#[ignore]
async fn ineligible_refund_still_writes_an_audit_row() {
    let pool = connect().await;
    // Reservation date is long past, so the cutoff tier applies at 0%
    let (reservation_id, user_id) = insert_reservation(&pool, "no_show", 100_000).await;
    insert_paid_deposit(&pool, reservation_id, user_id, 25_000).await;
    let processor = refund_processor(&pool);

    let outcome = processor
        .process_refund(&RefundRequest {
            reservation_id,
            user_id,
            cancellation_type: CancellationType::NoShow,
            preference: None,
            admin_override_percentage: None,
            reason: "automatic no-show refund".to_string(),
        })
        .await
        .expect("ineligible refund resolves without error");

    assert_eq!(outcome.status, RefundStatus::NotEligible);
    assert_eq!(outcome.refund_amount, 0);
    let audit_id = outcome.audit_id.expect("audit row recorded");

    let records = RefundAuditRepository::new(pool.clone())
        .find_by_reservation(reservation_id)
        .await
        .unwrap();
    let record = records
        .iter()
        .find(|r| r.id == audit_id)
        .expect("audit row retrievable");
    assert!(!record.succeeded);
    assert_eq!(record.refund_amount, 0);
    assert_eq!(record.cancellation_type, "no_show");
}

#[tokio::test]
#[ignore]
async fn duplicate_enqueue_is_ignored() {
    let pool = connect().await;
    let queue = NoShowQueueRepository::new(pool.clone());
    let reservation_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let first = queue.enqueue(reservation_id, user_id, Utc::now()).await.unwrap();
    assert!(first.is_some());
    let second = queue.enqueue(reservation_id, user_id, Utc::now()).await.unwrap();
    assert!(second.is_none());
}
