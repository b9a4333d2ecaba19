// template-sync schema - record store tables for Diesel ORM

diesel::table! {
    templates (id) {
        id -> Integer,
        remote_id -> Text,
        name -> Text,
        last_modified -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    field_mappings (id) {
        id -> Integer,
        template_id -> Integer,          // FK to templates.id
        remote_field_name -> Text,       // token name on the remote template
        local_field_name -> Nullable<Text>, // set by hand, never by sync
        is_inactive -> Bool,
        created_at -> Text,
    }
}

// ============================================================================
// Run log
// ============================================================================

diesel::table! {
    sync_runs (id) {
        id -> Integer,
        run_id -> Text,
        started_at -> Text,
        completed_at -> Nullable<Text>,
        templates_discovered -> Integer,
        templates_created -> Integer,
        mappings_created -> Integer,
        failure_count -> Integer,
        report_json -> Nullable<Text>,
    }
}

diesel::joinable!(field_mappings -> templates (template_id));
diesel::allow_tables_to_appear_in_same_query!(templates, field_mappings);
