#![allow(dead_code)]

use async_trait::async_trait;
use conference_portal::auth::AdminIdentity;
use conference_portal::config::{Config, FeeSchedule, GatewayConfig};
use conference_portal::db::{InMemoryDirectory, PaymentRole, PaymentTransaction, UserProfile};
use conference_portal::error::{AppError, Result};
use conference_portal::hash;
use conference_portal::payment::{
    format_amount, CallbackPayload, GatewayClient, InitiationRequest,
};
use conference_portal::state::{AppState, Stores};
use conference_portal::storage::{BlobStore, LocalBlobStore};
use conference_portal::submissions::{AuthorInput, NewSubmission, UploadedFile};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const GATEWAY_KEY: &str = "KEY123";
pub const GATEWAY_SALT: &str = "SALT456";
pub const WAIVED_AFFILIATION: &str = "Host University";

/// Gateway stand-in that hands out predictable access keys.
#[derive(Default)]
pub struct FakeGateway {
    pub fail: AtomicBool,
    pub requests: Mutex<Vec<InitiationRequest>>,
}

impl FakeGateway {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    async fn initiate(&self, request: &InitiationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamGateway {
                message: "HTTP 503: maintenance".to_string(),
            });
        }
        Ok(format!("access-{}", request.txnid))
    }

    fn payment_url(&self, access_key: &str) -> String {
        format!("https://gateway.test/pay/{}", access_key)
    }
}

/// Local blob store that counts writes and deletes.
pub struct CountingBlobStore {
    inner: LocalBlobStore,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CountingBlobStore {
    pub fn new(dir: &TempDir, public_base_url: &str) -> Self {
        Self {
            inner: LocalBlobStore::new(dir.path().to_path_buf(), public_base_url),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn put(&self, folder: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(folder, filename, bytes).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(url).await
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub stores: Stores,
    pub directory: Arc<InMemoryDirectory>,
    pub gateway: Arc<FakeGateway>,
    pub blobs: Arc<CountingBlobStore>,
    pub upload_dir: TempDir,
}

pub fn test_config(upload_dir: &TempDir) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        upload_folder: upload_dir.path().to_path_buf(),
        public_base_url: "http://api.test".to_string(),
        reference_prefix: "X".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        gateway: GatewayConfig {
            key: GATEWAY_KEY.to_string(),
            salt: GATEWAY_SALT.to_string(),
            base_url: "https://gateway.test".to_string(),
            env: "test".to_string(),
        },
        fees: FeeSchedule {
            author: dec!(2500.00),
            attendee: dec!(1000.00),
        },
        fee_waiver_affiliations: vec![WAIVED_AFFILIATION.to_string()],
        default_frontend_url: "http://frontend.test".to_string(),
        payment_expiry: Duration::from_secs(24 * 3600),
        reconcile_interval: Duration::from_secs(900),
    }
}

impl Harness {
    pub async fn new() -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(&upload_dir));
        let (stores, directory) = Stores::in_memory();
        let gateway = Arc::new(FakeGateway::default());
        let blobs = Arc::new(CountingBlobStore::new(&upload_dir, &config.public_base_url));

        directory
            .insert(profile("ADMIN", PaymentRole::Attendee, "Programme Committee", true))
            .await;

        let state = Arc::new(AppState::new(
            config,
            stores.clone(),
            blobs.clone(),
            gateway.clone(),
        ));

        Self {
            state,
            stores,
            directory,
            gateway,
            blobs,
            upload_dir,
        }
    }

    pub async fn add_user(&self, uid: &str, role: PaymentRole, affiliation: &str) {
        self.directory
            .insert(profile(uid, role, affiliation, false))
            .await;
    }

    pub async fn admin(&self) -> AdminIdentity {
        self.state.authorizer.require_admin("ADMIN").await.unwrap()
    }
}

pub fn profile(uid: &str, role: PaymentRole, affiliation: &str, is_admin: bool) -> UserProfile {
    UserProfile {
        uid: uid.to_string(),
        name: format!("User {}", uid),
        email: format!("{}@example.org", uid.to_lowercase()),
        phone: "9876543210".to_string(),
        affiliation: affiliation.to_string(),
        role,
        is_admin,
    }
}

pub fn authors() -> Vec<AuthorInput> {
    vec![
        AuthorInput {
            name: Some("Ada Lovelace".into()),
            affiliation: Some("Analytical Society".into()),
            email: Some("ada@example.org".into()),
            phone: Some("9876543210".into()),
        },
        AuthorInput {
            name: Some("Charles Babbage".into()),
            affiliation: Some("Analytical Society".into()),
            ..Default::default()
        },
    ]
}

pub fn pdf(name: &str, len: usize) -> UploadedFile {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.resize(len.max(bytes.len()), b'0');
    UploadedFile {
        filename: name.to_string(),
        bytes,
    }
}

pub fn new_submission(owner: &str, reference: Option<&str>, file: UploadedFile) -> NewSubmission {
    NewSubmission {
        owner: owner.to_string(),
        title: "On the Analytical Engine".to_string(),
        authors: authors(),
        reference_number: reference.map(str::to_string),
        file,
    }
}

/// A callback exactly as the gateway would sign it for `tx`.
pub fn signed_callback(tx: &PaymentTransaction, status: &str) -> CallbackPayload {
    let amount = format_amount(tx.amount);
    CallbackPayload {
        status: status.to_string(),
        email: tx.payer.email.clone(),
        firstname: tx.payer.name.clone(),
        productinfo: tx.product_info.clone(),
        amount: amount.clone(),
        txnid: tx.txnid.clone(),
        hash: hash::reverse_hash(
            GATEWAY_SALT,
            status,
            &tx.payer.email,
            &tx.payer.name,
            &tx.product_info,
            &amount,
            &tx.txnid,
            GATEWAY_KEY,
        ),
        easepayid: Some("E900001".to_string()),
        error_message: None,
    }
}
