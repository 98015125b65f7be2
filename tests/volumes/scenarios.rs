//! BDD scenarios for the volume workflows.

use rstest_bdd_macros::scenario;

use super::test_helpers::{VolumeContext, volume_context};

#[scenario(
    path = "tests/features/create.feature",
    name = "Create a volume from a local image"
)]
fn scenario_create_volume(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/create.feature",
    name = "Surface failed imports and keep the staged object"
)]
fn scenario_failed_import(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/create.feature",
    name = "Stop waiting once the poll bound is reached"
)]
fn scenario_import_timeout(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/create.feature",
    name = "Surface materialisation failures"
)]
fn scenario_materialisation_failure(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/create.feature",
    name = "Reject malformed tags before building anything"
)]
fn scenario_malformed_tags(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/manage.feature",
    name = "List a freshly created volume by name"
)]
fn scenario_list_created(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(path = "tests/features/manage.feature", name = "List an empty account")]
fn scenario_list_empty(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/manage.feature",
    name = "Reject a second attachment on the same instance"
)]
fn scenario_attach_conflict(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/manage.feature",
    name = "Refuse to delete an attached volume"
)]
fn scenario_delete_in_use(volume_context: VolumeContext) {
    let _ = volume_context;
}

#[scenario(
    path = "tests/features/manage.feature",
    name = "Detach and then delete a volume"
)]
fn scenario_detach_then_delete(volume_context: VolumeContext) {
    let _ = volume_context;
}
