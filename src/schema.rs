diesel::table! {
    users (id) {
        id -> Uuid,
        first_name -> Varchar,
        email -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    venues (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Varchar,
        price -> Numeric,
        category -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    bookings (id) {
        id -> Int8,
        user_id -> Uuid,
        venue_id -> Uuid,
        event_name -> Varchar,
        event_type -> Varchar,
        booking_date -> Date,
        start_time -> Time,
        end_time -> Time,
        total_price -> Numeric,
        special_requests -> Nullable<Text>,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        provider_order_id -> Varchar,
        provider_payment_id -> Varchar,
        booking_id -> Int8,
        user_id -> Uuid,
        amount -> Numeric,
        payment_method -> Varchar,
        payment_status -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        user_id -> Uuid,
        booking_id -> Nullable<Int8>,
        message -> Text,
        #[sql_name = "type"]
        type_ -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    venues,
    bookings,
    payments,
    notifications,
);
