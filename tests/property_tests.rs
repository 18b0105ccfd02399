//! Property-based tests for the stock ledger's pure arithmetic.
//!
//! These tests use proptest to verify invariants across a wide range of
//! inputs: the movement-type algebra, rebuilding balances from a movement
//! trail, stock level derivations, pagination math, and the error-to-response
//! mapping. No database or async runtime is involved.

use axum::http::StatusCode;
use proptest::prelude::*;
use strum::IntoEnumIterator;

use stock_ledger_api::entities::stock_level;
use stock_ledger_api::entities::stock_movement::MovementType;
use stock_ledger_api::errors::ServiceError;
use stock_ledger_api::PaginatedResponse;

// Strategies for generating test data
fn movement_type_strategy() -> impl Strategy<Value = MovementType> {
    proptest::sample::select(MovementType::iter().collect::<Vec<_>>())
}

fn movement_batch_strategy() -> impl Strategy<Value = Vec<(MovementType, i64)>> {
    proptest::collection::vec((movement_type_strategy(), 1i64..=500), 0..60)
}

fn client_error_strategy() -> impl Strategy<Value = (String, ServiceError)> {
    ("[A-Za-z0-9][A-Za-z0-9 ,.:-]{0,60}", 0usize..5).prop_map(|(message, pick)| {
        let error = match pick {
            0 => ServiceError::NotFound(message.clone()),
            1 => ServiceError::ValidationError(message.clone()),
            2 => ServiceError::InvalidQuantity(message.clone()),
            3 => ServiceError::InvalidState(message.clone()),
            _ => ServiceError::ConcurrencyConflict(message.clone()),
        };
        (message, error)
    })
}

fn server_error_strategy() -> impl Strategy<Value = ServiceError> {
    ("[a-z0-9 ]{1,60}", 0usize..3).prop_map(|(detail, pick)| match pick {
        0 => ServiceError::db_error(detail),
        1 => ServiceError::EventError(detail),
        _ => ServiceError::InternalError(detail),
    })
}

// Property: every movement type moves the balance by exactly one unit step
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn movement_direction_is_a_unit_step(movement_type in movement_type_strategy()) {
        let direction = movement_type.direction();
        prop_assert!(
            direction == 1 || direction == -1,
            "direction for {} must be +1 or -1, got {}",
            movement_type.as_str(),
            direction
        );
        prop_assert_eq!(movement_type.is_inbound(), direction == 1);
    }

    #[test]
    fn signed_quantity_keeps_the_magnitude(
        movement_type in movement_type_strategy(),
        quantity in 1i64..=1_000_000,
    ) {
        let signed = movement_type.signed_quantity(quantity);
        prop_assert_eq!(signed.abs(), quantity);
        prop_assert_eq!(signed > 0, movement_type.is_inbound());
    }
}

// Property: replaying a movement trail reproduces the balance
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn a_guarded_replay_never_dips_below_zero(batch in movement_batch_strategy()) {
        let (applied, balance) = replay_with_floor(&batch);
        prop_assert!(balance >= 0, "final balance went negative: {}", balance);
        for row in &applied {
            prop_assert!(
                row.quantity_after >= 0,
                "an applied movement left a negative balance: {}",
                row.quantity_after
            );
        }
    }

    #[test]
    fn the_trail_links_and_sums_to_the_balance(batch in movement_batch_strategy()) {
        let (applied, balance) = replay_with_floor(&batch);

        let mut previous_after = 0;
        for row in &applied {
            prop_assert_eq!(row.quantity_before, previous_after);
            prop_assert_eq!(
                row.quantity_after,
                row.quantity_before + row.movement_type.signed_quantity(row.quantity)
            );
            previous_after = row.quantity_after;
        }

        let replayed: i64 = applied
            .iter()
            .map(|row| row.movement_type.signed_quantity(row.quantity))
            .sum();
        prop_assert_eq!(replayed, balance);
    }

    #[test]
    fn inbound_movements_are_never_refused(batch in movement_batch_strategy()) {
        let (applied, _) = replay_with_floor(&batch);
        let generated = batch
            .iter()
            .filter(|(movement_type, _)| movement_type.is_inbound())
            .count();
        let kept = applied
            .iter()
            .filter(|row| row.movement_type.is_inbound())
            .count();
        prop_assert_eq!(kept, generated, "an inbound movement was dropped by the floor guard");
    }
}

// Property: available stock and the reorder signal derive from the row
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn available_is_on_hand_minus_reserved(
        on_hand in 0i64..1_000_000,
        reserved in 0i64..1_000_000,
    ) {
        prop_assert_eq!(level(on_hand, reserved, 0).available(), on_hand - reserved);
    }

    #[test]
    fn the_reorder_signal_watches_available_not_on_hand(
        on_hand in 0i64..10_000,
        reserved in 0i64..10_000,
        reorder_level in 1i64..1_000,
    ) {
        let row = level(on_hand, reserved, reorder_level);
        prop_assert_eq!(row.is_below_reorder_level(), row.available() <= reorder_level);
    }

    #[test]
    fn a_zero_reorder_level_never_signals(
        on_hand in 0i64..10_000,
        reserved in 0i64..10_000,
    ) {
        prop_assert!(!level(on_hand, reserved, 0).is_below_reorder_level());
    }
}

// Property: pagination covers every item and never pads an empty page
proptest! {
    #[test]
    fn page_count_covers_the_total(
        total in 0u64..50_000,
        page in 1u64..100,
        limit in 1u64..1_000,
    ) {
        let response: PaginatedResponse<i64> =
            PaginatedResponse::new(Vec::new(), total, page, limit);
        prop_assert_eq!(response.page, page);
        prop_assert!(response.total_pages * limit >= total, "pages do not cover the total");
        if total == 0 {
            prop_assert_eq!(response.total_pages, 0);
        } else {
            prop_assert!(
                (response.total_pages - 1) * limit < total,
                "the last page would be empty"
            );
        }
    }

    #[test]
    fn a_zero_limit_yields_no_pages(total in 0u64..10_000) {
        let response: PaginatedResponse<i64> = PaginatedResponse::new(Vec::new(), total, 1, 0);
        prop_assert_eq!(response.total_pages, 0);
    }
}

// Property: error responses keep client detail and hide server detail
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn client_errors_keep_their_message((message, error) in client_error_strategy()) {
        prop_assert!(error.status_code().is_client_error());
        prop_assert!(
            error.response_message().contains(&message),
            "client error hides its message: {:?}",
            error
        );
    }

    #[test]
    fn server_errors_answer_with_a_generic_message(error in server_error_strategy()) {
        prop_assert!(error.status_code().is_server_error());
        let message = error.response_message();
        prop_assert!(
            message == "Database error" || message == "Internal server error",
            "server error leaked detail: {}",
            message
        );
    }

    #[test]
    fn stock_shortfalls_report_their_numbers(
        product_id in 1i64..1_000_000,
        available in 0i64..10_000,
        requested in 1i64..10_000,
    ) {
        let error = ServiceError::InsufficientAvailable {
            product_id,
            location: "MAIN".to_string(),
            available,
            requested,
        };
        prop_assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let message = error.response_message();
        prop_assert!(message.contains(&product_id.to_string()));
        prop_assert!(message.contains(&available.to_string()));
        prop_assert!(message.contains(&requested.to_string()));
    }

    #[test]
    fn only_version_conflicts_are_retryable((_message, error) in client_error_strategy()) {
        prop_assert_eq!(
            error.is_retryable(),
            matches!(error, ServiceError::ConcurrencyConflict(_))
        );
    }
}

// Helpers for the replay properties
struct ReplayedMovement {
    movement_type: MovementType,
    quantity: i64,
    quantity_before: i64,
    quantity_after: i64,
}

/// Applies movements in order against a single balance. Outbound movements
/// that would take the balance negative are refused, as the ledger does
/// when nothing is reserved.
fn replay_with_floor(batch: &[(MovementType, i64)]) -> (Vec<ReplayedMovement>, i64) {
    let mut balance = 0i64;
    let mut applied = Vec::new();
    for (movement_type, quantity) in batch {
        let change = movement_type.signed_quantity(*quantity);
        if balance + change < 0 {
            continue;
        }
        applied.push(ReplayedMovement {
            movement_type: *movement_type,
            quantity: *quantity,
            quantity_before: balance,
            quantity_after: balance + change,
        });
        balance += change;
    }
    (applied, balance)
}

fn level(on_hand: i64, reserved: i64, reorder_level: i64) -> stock_level::Model {
    stock_level::Model {
        id: 1,
        product_id: 1,
        location: "MAIN".to_string(),
        quantity_on_hand: on_hand,
        quantity_reserved: reserved,
        reorder_level,
        reorder_quantity: 0,
        last_stock_take_date: None,
        version: 1,
        created_at: chrono::Utc::now().into(),
        updated_at: chrono::Utc::now().into(),
    }
}
