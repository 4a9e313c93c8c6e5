//! Walk one booking through the whole flow and print what happened.
//!
//! Run with: cargo run -p booking_core --example session_run

use booking_core::booking::BookingStep;
use booking_core::clock::ONE_SEC_MS;
use booking_core::session::build_session;
use booking_core::stations::StationId;
use booking_core::test_helpers::{central_point, test_params};
use booking_core::verification::VerificationGate;

fn main() {
    const RIDE_SECONDS: u64 = 95;

    let mut controller = build_session(test_params());

    println!("--- Stations near Central ---");
    for station in controller.ranked_stations(central_point()) {
        println!(
            "  {:?}  {}  vehicle_on_site={}",
            station.id, station.name, station.has_virtual_car
        );
    }

    controller.select_departure(StationId(1)).expect("departure");
    controller.confirm_date_time(true);
    controller
        .advance_step(BookingStep::SelectingArrival)
        .expect("advance");
    controller.select_arrival(StationId(4)).expect("arrival");

    // Let the debounced fetches and their responses resolve.
    controller.run_until_idle(100);
    if let Some(route) = controller.trip_route() {
        println!(
            "\nTrip route: {} m, ~{} s drive",
            route.distance_meters, route.duration_seconds
        );
    }
    if let Some(route) = controller.dispatch_route() {
        println!(
            "Dispatch route: {} m (vehicle coming to the departure station)",
            route.distance_meters
        );
    }

    controller.begin_trip().expect("begin trip");
    for gate in [
        VerificationGate::Identity,
        VerificationGate::License,
        VerificationGate::Address,
    ] {
        controller.set_verification_gate(gate, true);
    }
    controller.unlock().expect("unlock");

    let unlocked_at = controller.now();
    controller.run_until(unlocked_at + RIDE_SECONDS * ONE_SEC_MS);

    let usage_fare = controller.end_trip().expect("end trip");
    println!(
        "\nRode {} s, billed {} cents usage on top of the base fare",
        RIDE_SECONDS, usage_fare
    );

    println!("\n--- Telemetry ---");
    let telemetry = controller.telemetry();
    for charge in &telemetry.charges {
        println!(
            "  charge {:?}: {} cents ({})",
            charge.purpose, charge.amount_cents, charge.transaction_id
        );
    }
    for trip in &telemetry.completed_trips {
        println!(
            "  trip {:?} -> {:?}: {} started minute(s)",
            trip.departure, trip.arrival, trip.minutes_used
        );
    }
}
