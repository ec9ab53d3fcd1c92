//! Diesel table definitions for the edge-node store. The actual DDL lives
//! in [`crate::store`] and is applied idempotently at startup.

diesel::table! {
    events (event_id) {
        event_id -> Text,
        json -> Text,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    pending_uploads (upload_id) {
        upload_id -> Text,
        event_id -> Text,
        filepath -> Text,
        attempts -> Integer,
        last_attempt_ts -> Nullable<Timestamp>,
        status -> Text,
        checksum -> Nullable<Text>,
        final_url -> Nullable<Text>,
    }
}

diesel::table! {
    kb_meta (id) {
        id -> Integer,
        kb_version -> Text,
        applied_at -> Timestamp,
    }
}

diesel::table! {
    device_state (device_id) {
        device_id -> Text,
        last_heartbeat -> Timestamp,
        versions -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(events, pending_uploads);
