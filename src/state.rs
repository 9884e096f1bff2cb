use crate::auth::Authorizer;
use crate::config::Config;
use crate::db::{
    CounterStoreRef, DbPool, DirectoryRef, PaymentRepositoryRef, PgStore,
    SubmissionRepositoryRef, VerificationRepositoryRef,
};
use crate::db::{
    InMemoryCounterStore, InMemoryDirectory, InMemoryPaymentRepository,
    InMemorySubmissionRepository, InMemoryVerificationRepository,
};
use crate::payment::{AffiliationWaiver, GatewayClientRef, PaymentService, PaymentSettings};
use crate::receipt::ReceiptService;
use crate::storage::BlobStoreRef;
use crate::submissions::{ReferenceAllocator, SubmissionService};
use crate::verification::VerificationService;
use std::sync::Arc;

/// One handle per persistence port.
#[derive(Clone)]
pub struct Stores {
    pub counters: CounterStoreRef,
    pub submissions: SubmissionRepositoryRef,
    pub payments: PaymentRepositoryRef,
    pub verifications: VerificationRepositoryRef,
    pub directory: DirectoryRef,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            counters: store.clone(),
            submissions: store.clone(),
            payments: store.clone(),
            verifications: store.clone(),
            directory: store,
        }
    }

    /// Process-local stores; `directory` is returned separately so callers can
    /// seed user profiles.
    pub fn in_memory() -> (Self, Arc<InMemoryDirectory>) {
        let directory = Arc::new(InMemoryDirectory::new());
        let stores = Self {
            counters: Arc::new(InMemoryCounterStore::new()),
            submissions: Arc::new(InMemorySubmissionRepository::new()),
            payments: Arc::new(InMemoryPaymentRepository::new()),
            verifications: Arc::new(InMemoryVerificationRepository::new()),
            directory: directory.clone(),
        };
        (stores, directory)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authorizer: Authorizer,
    pub submissions: SubmissionService,
    pub payments: PaymentService,
    pub verification: VerificationService,
    pub receipts: ReceiptService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        stores: Stores,
        blobs: BlobStoreRef,
        gateway: GatewayClientRef,
    ) -> Self {
        let allocator = ReferenceAllocator::new(stores.counters.clone());
        let submissions = SubmissionService::new(
            stores.submissions.clone(),
            allocator,
            blobs.clone(),
            config.reference_prefix.clone(),
        );
        let waiver = Arc::new(AffiliationWaiver::new(
            config.fee_waiver_affiliations.iter().cloned(),
        ));
        let payments = PaymentService::new(
            stores.payments.clone(),
            stores.directory.clone(),
            submissions.clone(),
            gateway,
            waiver,
            PaymentSettings::from_config(&config),
        );

        Self {
            authorizer: Authorizer::new(stores.directory.clone()),
            verification: VerificationService::new(stores.verifications.clone(), blobs),
            receipts: ReceiptService::new(stores.payments.clone()),
            submissions,
            payments,
            config,
        }
    }
}
