use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, SchedulingConfig};
use shared_database::{InMemoryStore, SchedulingStore};
use shared_models::auth::User;
use shared_models::{
    Location, Period, PricingRule, Resource, Service, Shift, Technician, TechnicianPolicy,
    DEFAULT_AUTO_ASSIGN_PRIORITY,
};

use crate::state::AppState;
use crate::time::{BusinessCalendar, FixedClock};

pub struct TestConfig {
    pub jwt_secret: String,
    pub scheduling: SchedulingConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            scheduling: SchedulingConfig::default(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            bind_addr: "127.0.0.1:0".to_string(),
            seed_data_path: None,
            scheduling: self.scheduling.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "customer".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    /// A user whose subject is an existing technician id.
    pub fn for_technician(technician_id: Uuid, email: &str) -> Self {
        Self {
            id: technician_id.to_string(),
            email: email.to_string(),
            role: "technician".to_string(),
        }
    }

    pub fn technician(email: &str) -> Self {
        Self::new(email, "technician")
    }

    pub fn customer(email: &str) -> Self {
        Self::new(email, "customer")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).expect("test user ids are uuids")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

/// An in-memory store with one location and a clock pinned to 09:00
/// business time on Monday 2026-10-19.
pub struct SchedulingFixture {
    pub config: Arc<AppConfig>,
    pub store: Arc<InMemoryStore>,
    pub clock: FixedClock,
    pub calendar: BusinessCalendar,
    pub location: Location,
}

impl SchedulingFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let config = test_config.to_arc();
        let calendar = BusinessCalendar::new(&config.scheduling);
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        let clock = FixedClock(calendar.at(today, hm(9, 0)));

        let store = Arc::new(InMemoryStore::new());
        let location = Location {
            id: Uuid::new_v4(),
            name: "Main Studio".to_string(),
            address: Some("1 Harbour Road".to_string()),
        };
        store.add_location(location.clone()).await;

        Self {
            config,
            store,
            clock,
            calendar,
            location,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::with_clock(self.config.clone(), self.store.clone(), Arc::new(self.clock))
    }

    pub fn today(&self) -> NaiveDate {
        self.calendar.local_date(self.clock.0)
    }

    pub fn tomorrow(&self) -> NaiveDate {
        self.today() + Duration::days(1)
    }

    /// Business-local wall time on `date`.
    pub fn local(&self, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        self.calendar.at(date, hm(hour, minute))
    }

    pub async fn add_location(&self, name: &str) -> Location {
        let location = Location {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: None,
        };
        self.store.add_location(location.clone()).await;
        location
    }

    pub async fn add_service(
        &self,
        name: &str,
        technician_duration: i32,
        room_duration: i32,
        buffer_time: i32,
    ) -> Service {
        let service = Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            technician_duration,
            room_duration,
            buffer_time,
            slot_interval_minutes: None,
        };
        self.store.add_service(service.clone()).await;
        service
    }

    pub async fn put_service(&self, service: Service) -> Service {
        self.store.add_service(service.clone()).await;
        service
    }

    pub async fn add_technician(&self, nickname: &str, service_ids: &[Uuid]) -> Technician {
        let technician = Technician {
            id: Uuid::new_v4(),
            nickname: nickname.to_string(),
            service_ids: service_ids.to_vec(),
        };
        self.store.add_technician(technician.clone()).await;
        technician
    }

    pub async fn add_resource(&self, name: &str, service_ids: &[Uuid]) -> Resource {
        self.add_resource_at(self.location.id, name, service_ids).await
    }

    pub async fn add_resource_at(&self, location_id: Uuid, name: &str, service_ids: &[Uuid]) -> Resource {
        let resource = Resource {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location_id,
            service_ids: service_ids.to_vec(),
        };
        self.store.add_resource(resource.clone()).await;
        resource
    }

    /// Default policy row for `technician_id`; adjust fields then `set_policy`.
    pub fn policy(technician_id: Uuid, location_id: Option<Uuid>) -> TechnicianPolicy {
        TechnicianPolicy {
            technician_id,
            location_id,
            max_daily_online: None,
            max_morning_online: None,
            max_afternoon_online: None,
            auto_assign_priority: DEFAULT_AUTO_ASSIGN_PRIORITY,
            allow_public_booking: true,
        }
    }

    pub async fn set_policy(&self, policy: TechnicianPolicy) {
        self.store.upsert_policy(policy).await;
    }

    pub async fn add_price(
        &self,
        service_id: Uuid,
        technician_id: Option<Uuid>,
        location_id: Option<Uuid>,
        price: i64,
    ) -> PricingRule {
        let rule = PricingRule {
            id: Uuid::new_v4(),
            service_id,
            technician_id,
            location_id,
            price,
            is_active: true,
        };
        self.store.upsert_pricing_rule(rule.clone()).await;
        rule
    }

    /// Inserts a self-service shift at the fixture location.
    pub async fn add_shift(&self, technician_id: Uuid, date: NaiveDate, period: Period) -> Shift {
        let window = self
            .calendar
            .period_window(date, period)
            .expect("default periods are valid");
        let shift = Shift {
            id: Uuid::new_v4(),
            technician_id,
            location_id: self.location.id,
            start_time: window.start,
            end_time: window.end,
            period: Some(period),
            is_cancelled: false,
            locked_by_admin: false,
            created_by: technician_id,
            cancelled_by: None,
            cancelled_at: None,
            created_at: self.clock.0,
        };
        self.store.insert_shift(shift).await.expect("fixture shift must not overlap")
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid wall time")
}
