use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use futures::future::{join_all, BoxFuture};
use uuid::Uuid;

use appointment_cell::{
    AppointmentBookingService, AppointmentError, AppointmentLifecycleService, AvailabilityService,
};
use shared_database::{InMemoryStore, SchedulingStore, ShiftFilter, StoreResult};
use shared_models::error::ErrorKind;
use shared_models::{
    Appointment, AppointmentStatus, Location, NewBooking, Occupancy, Period, PricingRule, Resource,
    Service, Shift, Technician, TechnicianPolicy, TimeWindow,
};
use shared_utils::test_utils::SchedulingFixture;
use shared_utils::AppState;

type Interleaved = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Delegates to an in-memory store, running one competing operation just
/// before the next appointment write reaches it. Reads done by the service
/// under test therefore see the state from before the competing write.
struct InterleavingStore {
    inner: Arc<InMemoryStore>,
    before_next_write: Mutex<Option<Interleaved>>,
}

impl InterleavingStore {
    fn new<F>(inner: Arc<InMemoryStore>, competing: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        Self {
            inner,
            before_next_write: Mutex::new(Some(Box::new(competing))),
        }
    }

    async fn interleave(&self) {
        let competing = self.before_next_write.lock().unwrap().take();
        if let Some(competing) = competing {
            competing().await;
        }
    }
}

#[async_trait]
impl SchedulingStore for InterleavingStore {
    async fn get_location(&self, id: Uuid) -> StoreResult<Option<Location>> {
        self.inner.get_location(id).await
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        self.inner.list_locations().await
    }

    async fn get_services(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Service>> {
        self.inner.get_services(ids).await
    }

    async fn services_at_location(&self, location_id: Uuid) -> StoreResult<Vec<Service>> {
        self.inner.services_at_location(location_id).await
    }

    async fn get_technician(&self, id: Uuid) -> StoreResult<Option<Technician>> {
        self.inner.get_technician(id).await
    }

    async fn technicians_capable_of(&self, service_ids: &[Uuid]) -> StoreResult<Vec<Technician>> {
        self.inner.technicians_capable_of(service_ids).await
    }

    async fn resources_capable_of(&self, location_id: Uuid, service_ids: &[Uuid]) -> StoreResult<Vec<Resource>> {
        self.inner.resources_capable_of(location_id, service_ids).await
    }

    async fn get_shift(&self, id: Uuid) -> StoreResult<Option<Shift>> {
        self.inner.get_shift(id).await
    }

    async fn find_shifts(&self, filter: &ShiftFilter) -> StoreResult<Vec<Shift>> {
        self.inner.find_shifts(filter).await
    }

    async fn insert_shift(&self, shift: Shift) -> StoreResult<Shift> {
        self.inner.insert_shift(shift).await
    }

    async fn cancel_shift(&self, id: Uuid, actor: Uuid, at: DateTime<Utc>) -> StoreResult<Shift> {
        self.inner.cancel_shift(id, actor, at).await
    }

    async fn technician_policies(
        &self,
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<Vec<TechnicianPolicy>> {
        self.inner.technician_policies(technician_ids, location_id).await
    }

    async fn pricing_rules(
        &self,
        service_ids: &[Uuid],
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<Vec<PricingRule>> {
        self.inner.pricing_rules(service_ids, technician_ids, location_id).await
    }

    async fn technician_occupancies(&self, technician_ids: &[Uuid], window: TimeWindow) -> StoreResult<Vec<Occupancy>> {
        self.inner.technician_occupancies(technician_ids, window).await
    }

    async fn resource_occupancies(&self, resource_ids: &[Uuid], window: TimeWindow) -> StoreResult<Vec<Occupancy>> {
        self.inner.resource_occupancies(resource_ids, window).await
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        self.inner.get_appointment(id).await
    }

    async fn commit_appointment(&self, booking: NewBooking) -> StoreResult<Appointment> {
        self.interleave().await;
        self.inner.commit_appointment(booking).await
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        self.interleave().await;
        self.inner.update_appointment_status(id, expected, status).await
    }
}

fn interleaved_state(fixture: &SchedulingFixture, store: InterleavingStore) -> AppState {
    AppState::with_clock(fixture.config.clone(), Arc::new(store), Arc::new(fixture.clock))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_for_one_slot_admit_exactly_one() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 15).await;
    let tech = fixture.add_technician("Lin", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(tech.id, fixture.tomorrow(), Period::Morning).await;

    let start = fixture.local(fixture.tomorrow(), 9, 30);
    let state = fixture.state();
    let location_id = fixture.location.id;
    let service_id = facial.id;

    let attempts = (0..8).map(|_| {
        let state = state.clone();
        tokio::spawn(async move {
            AppointmentBookingService::new(&state)
                .create_appointment(Uuid::new_v4(), service_id, location_id, start)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(confirmed, 1);
    for failure in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(failure.kind(), ErrorKind::Conflict);
    }
    assert_eq!(fixture.store.appointment_count().await, 1);
}

#[tokio::test]
async fn test_lower_priority_value_is_allocated_first() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let senior = fixture.add_technician("Zoe", &[facial.id]).await;
    let junior = fixture.add_technician("Amy", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_resource("Room 2", &[facial.id]).await;
    for (tech, priority) in [(senior.id, 10), (junior.id, 90)] {
        fixture.add_shift(tech, fixture.tomorrow(), Period::Morning).await;
        let mut policy = SchedulingFixture::policy(tech, None);
        policy.auto_assign_priority = priority;
        fixture.set_policy(policy).await;
    }

    let start = fixture.local(fixture.tomorrow(), 8, 30);
    let service = AppointmentBookingService::new(&fixture.state());

    let first = service
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, start)
        .await
        .unwrap();
    assert_eq!(first.technician_id, senior.id);

    let second = service
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, start)
        .await
        .unwrap();
    assert_eq!(second.technician_id, junior.id);
    assert_ne!(second.resource_id, first.resource_id);
    assert_eq!(second.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_morning_quota_diverts_to_next_technician() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let capped = fixture.add_technician("Amy", &[facial.id]).await;
    let backup = fixture.add_technician("Bea", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(capped.id, fixture.tomorrow(), Period::Morning).await;
    fixture.add_shift(backup.id, fixture.tomorrow(), Period::Morning).await;

    let mut policy = SchedulingFixture::policy(capped.id, None);
    policy.auto_assign_priority = 10;
    policy.max_morning_online = Some(1);
    fixture.set_policy(policy).await;

    let day = fixture.tomorrow();
    let service = AppointmentBookingService::new(&fixture.state());

    let first = service
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, fixture.local(day, 8, 30))
        .await
        .unwrap();
    assert_eq!(first.technician_id, capped.id);

    let second = service
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, fixture.local(day, 10, 30))
        .await
        .unwrap();
    assert_eq!(second.technician_id, backup.id);
}

#[tokio::test]
async fn test_every_offered_slot_can_be_booked() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 15).await;
    let lin = fixture.add_technician("Lin", &[facial.id]).await;
    let mei = fixture.add_technician("Mei", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_resource("Room 2", &[facial.id]).await;
    fixture.add_shift(lin.id, fixture.tomorrow(), Period::Morning).await;
    fixture.add_shift(mei.id, fixture.tomorrow(), Period::Afternoon).await;

    let state = fixture.state();
    let availability = AvailabilityService::new(&state);
    let booking = AppointmentBookingService::new(&state);
    let day = fixture.tomorrow();

    let mut booked = 0;
    loop {
        let slots = availability
            .get_available_slots(fixture.location.id, facial.id, day)
            .await
            .unwrap();
        let Some(first) = slots.first() else { break };

        let time = NaiveTime::parse_from_str(first, "%H:%M").unwrap();
        let start = fixture.local(day, time.hour(), time.minute());
        booking
            .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, start)
            .await
            .unwrap_or_else(|e| panic!("offered slot {} was not bookable: {}", first, e));

        booked += 1;
        assert!(booked < 20, "availability never converged");
    }

    // 08:30 and 10:30 in the morning, 14:00 and 16:00 in the afternoon.
    assert_eq!(booked, 4);
}

#[tokio::test]
async fn test_allocation_failures_are_distinguished() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let lin = fixture.add_technician("Lin", &[facial.id]).await;
    let mei = fixture.add_technician("Mei", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(lin.id, fixture.tomorrow(), Period::Morning).await;

    let day = fixture.tomorrow();
    let service = AppointmentBookingService::new(&fixture.state());
    let book = |start| service.create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, start);

    // Afternoon has nobody on shift.
    let err = book(fixture.local(day, 14, 0)).await.unwrap_err();
    assert_matches!(err, AppointmentError::NoTechnicianScheduled { .. });
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Runs past the end of the morning shift.
    assert_matches!(
        book(fixture.local(day, 12, 0)).await,
        Err(AppointmentError::NoTechnicianScheduled { .. })
    );

    book(fixture.local(day, 9, 0)).await.unwrap();

    // Lin is busy and is the only one scheduled.
    let err = book(fixture.local(day, 9, 30)).await.unwrap_err();
    assert_matches!(err, AppointmentError::TechniciansExhausted { .. });
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Mei is free but the only room is taken.
    fixture.add_shift(mei.id, day, Period::Morning).await;
    let err = book(fixture.local(day, 9, 30)).await.unwrap_err();
    assert_matches!(err, AppointmentError::NoResourceAvailable { .. });
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_unknown_references_are_not_found() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let service = AppointmentBookingService::new(&fixture.state());
    let start = fixture.local(fixture.tomorrow(), 9, 0);

    let err = service
        .create_appointment(Uuid::new_v4(), Uuid::new_v4(), fixture.location.id, start)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::ServiceNotFound(_));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_matches!(
        service
            .create_appointment(Uuid::new_v4(), facial.id, Uuid::new_v4(), start)
            .await,
        Err(AppointmentError::LocationNotFound(_))
    );
}

#[tokio::test]
async fn test_cancellation_releases_the_slot() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 15).await;
    let tech = fixture.add_technician("Lin", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(tech.id, fixture.tomorrow(), Period::Morning).await;

    let state = fixture.state();
    let day = fixture.tomorrow();
    let availability = AvailabilityService::new(&state);
    let lifecycle = AppointmentLifecycleService::new(&state);
    let customer = Uuid::new_v4();

    let appointment = AppointmentBookingService::new(&state)
        .create_appointment(customer, facial.id, fixture.location.id, fixture.local(day, 8, 30))
        .await
        .unwrap();

    let slots = availability
        .get_available_slots(fixture.location.id, facial.id, day)
        .await
        .unwrap();
    assert_eq!(slots, vec!["10:30"]);

    let cancelled = lifecycle.cancel_appointment(appointment.id, customer).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let slots = availability
        .get_available_slots(fixture.location.id, facial.id, day)
        .await
        .unwrap();
    assert_eq!(slots, vec!["08:30", "09:30", "10:30"]);

    assert_matches!(
        lifecycle.complete_appointment(appointment.id).await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );
    assert_matches!(
        lifecycle.get_appointment(Uuid::new_v4()).await,
        Err(AppointmentError::NotFound(_))
    );
}

#[tokio::test]
async fn test_completed_appointment_keeps_its_claim() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let tech = fixture.add_technician("Lin", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(tech.id, fixture.tomorrow(), Period::Morning).await;

    let state = fixture.state();
    let start = fixture.local(fixture.tomorrow(), 8, 30);
    let appointment = AppointmentBookingService::new(&state)
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, start)
        .await
        .unwrap();

    let completed = AppointmentLifecycleService::new(&state)
        .complete_appointment(appointment.id)
        .await
        .unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);

    let window = TimeWindow::new(start, fixture.local(fixture.tomorrow(), 9, 30));
    let claims = fixture
        .store
        .technician_occupancies(&[tech.id], window)
        .await
        .unwrap();
    assert_eq!(claims.len(), 1);
}

#[tokio::test]
async fn test_shift_cancelled_during_booking_blocks_the_commit() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 15).await;
    let tech = fixture.add_technician("Lin", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    let shift = fixture.add_shift(tech.id, fixture.tomorrow(), Period::Morning).await;

    let inner = fixture.store.clone();
    let (shift_id, now) = (shift.id, fixture.clock.0);
    let store = InterleavingStore::new(fixture.store.clone(), move || {
        Box::pin(async move {
            inner
                .cancel_shift(shift_id, Uuid::new_v4(), now)
                .await
                .expect("nothing is booked inside the shift yet");
        })
    });
    let state = interleaved_state(&fixture, store);

    let err = AppointmentBookingService::new(&state)
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, fixture.local(fixture.tomorrow(), 9, 30))
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::Conflict(_));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(fixture.store.appointment_count().await, 0);
    assert!(fixture.store.get_shift(shift.id).await.unwrap().unwrap().is_cancelled);
}

#[tokio::test]
async fn test_quota_reached_during_booking_blocks_the_commit() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let tech = fixture.add_technician("Lin", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(tech.id, fixture.tomorrow(), Period::Morning).await;
    let mut policy = SchedulingFixture::policy(tech.id, None);
    policy.max_daily_online = Some(1);
    fixture.set_policy(policy).await;

    let day = fixture.tomorrow();
    let later = fixture.local(day, 11, 30);
    let direct = fixture.state();
    let (service_id, location_id) = (facial.id, fixture.location.id);
    let store = InterleavingStore::new(fixture.store.clone(), move || {
        Box::pin(async move {
            AppointmentBookingService::new(&direct)
                .create_appointment(Uuid::new_v4(), service_id, location_id, later)
                .await
                .expect("the competing booking is taken first");
        })
    });
    let state = interleaved_state(&fixture, store);

    let err = AppointmentBookingService::new(&state)
        .create_appointment(Uuid::new_v4(), facial.id, fixture.location.id, fixture.local(day, 8, 30))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(fixture.store.appointment_count().await, 1);
    let claims = fixture
        .store
        .technician_occupancies(&[tech.id], fixture.calendar.day_window(day))
        .await
        .unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].start_time, later);
}

#[tokio::test]
async fn test_cancel_after_concurrent_completion_keeps_the_claim() {
    let fixture = SchedulingFixture::new().await;
    let facial = fixture.add_service("Facial", 60, 60, 0).await;
    let tech = fixture.add_technician("Lin", &[facial.id]).await;
    fixture.add_resource("Room 1", &[facial.id]).await;
    fixture.add_shift(tech.id, fixture.tomorrow(), Period::Morning).await;

    let customer = Uuid::new_v4();
    let start = fixture.local(fixture.tomorrow(), 8, 30);
    let appointment = AppointmentBookingService::new(&fixture.state())
        .create_appointment(customer, facial.id, fixture.location.id, start)
        .await
        .unwrap();

    let direct = fixture.state();
    let appointment_id = appointment.id;
    let store = InterleavingStore::new(fixture.store.clone(), move || {
        Box::pin(async move {
            AppointmentLifecycleService::new(&direct)
                .complete_appointment(appointment_id)
                .await
                .expect("the appointment is still confirmed");
        })
    });
    let state = interleaved_state(&fixture, store);

    let err = AppointmentLifecycleService::new(&state)
        .cancel_appointment(appointment.id, customer)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::Conflict(_));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = fixture.store.get_appointment(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Completed);
    let claims = fixture
        .store
        .technician_occupancies(&[tech.id], TimeWindow::new(start, fixture.local(fixture.tomorrow(), 9, 30)))
        .await
        .unwrap();
    assert_eq!(claims.len(), 1);
}
