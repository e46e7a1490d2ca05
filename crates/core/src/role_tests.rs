// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn front_matter_role_wins() {
    let content = "---\nrole: dev\n---\n\nYou are a product manager.\n";
    assert_eq!(Role::infer(content), Role::Dev);
}

#[test]
fn front_matter_tolerates_extra_keys() {
    let content = "---\nname: astro\nrole: PM\n---\nbody\n";
    assert_eq!(Role::infer(content), Role::Pm);
}

#[parameterized(
    product_manager = { "You act as the product manager for the team.", Role::Pm },
    software_engineer = { "A software engineer working on the backend.", Role::Dev },
    developer = { "Senior developer persona.", Role::Dev },
    bare_pm = { "Act as a pm.", Role::Pm },
    bare_dev = { "You are the dev on call.", Role::Dev },
    default_pm = { "General helper with no specific title.", Role::Pm },
)]
fn keyword_inference(content: &str, expected: Role) {
    assert_eq!(Role::infer(content), expected);
}

#[test]
fn devops_does_not_match_dev() {
    assert_eq!(Role::infer("You handle devops tooling."), Role::Pm);
}

#[test]
fn invalid_front_matter_falls_back_to_keywords() {
    let content = "---\nrole: [nonsense\n---\nsoftware engineer\n";
    assert_eq!(Role::infer(content), Role::Dev);
}

#[test]
fn role_display() {
    assert_eq!(Role::Pm.to_string(), "pm");
    assert_eq!(Role::Dev.to_string(), "dev");
}
