use std::time::Duration;

use super::ramp::round_half_even;
use super::{NavigationPlan, Ramp, Scenario, Window, clamp_ratio, parse_scenario};
use crate::error::ConfigError;

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn reference_ramp() -> Ramp {
    Ramp::new(secs(0), 10, secs(10), secs(20), secs(5))
}

#[test]
fn ramp_follows_trapezoid() -> Result<(), ConfigError> {
    let ramp = reference_ramp();
    let expectations = [(5, 5), (15, 10), (32, 6), (40, 0)];
    for (at, expected) in expectations {
        let planned = ramp.planned_at(secs(at));
        if planned != expected {
            return Err(ConfigError::from(format!(
                "planned_at({}) = {}, expected {}",
                at, planned, expected
            )));
        }
    }
    if ramp.total_duration() != secs(35) {
        return Err(ConfigError::from("Unexpected total duration"));
    }
    Ok(())
}

#[test]
fn ramp_is_idle_before_delay_and_at_end() -> Result<(), ConfigError> {
    let ramp = Ramp::new(secs(4), 8, secs(2), secs(2), secs(2));
    if ramp.planned_at(secs(3)) != 0 {
        return Err(ConfigError::from("Expected zero during delay"));
    }
    if ramp.planned_at(ramp.total_duration()) != 0 {
        return Err(ConfigError::from("Expected zero at the end"));
    }
    Ok(())
}

#[test]
fn zero_length_phases_are_steps() -> Result<(), ConfigError> {
    let ramp = Ramp::new(secs(1), 4, Duration::ZERO, secs(2), Duration::ZERO);
    if ramp.planned_at(secs(1)) != 4 {
        return Err(ConfigError::from("Expected instant ramp-up"));
    }
    if ramp.planned_at(Duration::from_millis(2_999)) != 4 {
        return Err(ConfigError::from("Expected plateau until the end"));
    }
    if ramp.planned_at(secs(3)) != 0 {
        return Err(ConfigError::from("Expected instant ramp-down"));
    }
    Ok(())
}

#[test]
fn rounding_is_half_to_even() -> Result<(), ConfigError> {
    let cases = [(500, 0), (1_500, 2), (2_500, 2), (2_501, 3), (3_499, 3)];
    for (milli, expected) in cases {
        if round_half_even(milli) != expected {
            return Err(ConfigError::from(format!("{} rounded wrong", milli)));
        }
    }
    // 3 peckers over 2s: 1.5 at t=1s rounds to 2
    let ramp = Ramp::new(secs(0), 3, secs(2), secs(1), secs(1));
    if ramp.planned_at(secs(1)) != 2 {
        return Err(ConfigError::from("Expected 1.5 to round to 2"));
    }
    Ok(())
}

fn single_ramp_scenario(ramp: Ramp) -> Result<Scenario, ConfigError> {
    let mut scenario = Scenario::new("s");
    scenario.add_navigation(NavigationPlan::new("a", "think", vec![ramp]))?;
    Ok(scenario)
}

#[test]
fn rescale_keeps_duration_and_scales_load() -> Result<(), ConfigError> {
    let original = reference_ramp();
    let before: Vec<u64> = (0..=36).map(|t| original.planned_milli_at(secs(t))).collect();
    let mut scenario = single_ramp_scenario(original)?;
    let duration = scenario.duration();

    let quota = scenario.rescale_by_ratio(0.5);

    if quota != 5 || scenario.max_concurrency() != 5 {
        return Err(ConfigError::from("Expected 5 peckers after halving"));
    }
    if scenario.duration() != duration {
        return Err(ConfigError::from("Rescale changed the duration"));
    }
    let ramp = scenario
        .navigation("a")
        .and_then(|nav| nav.ramps.first())
        .ok_or_else(|| ConfigError::from("Missing ramp"))?;
    for (t, planned) in (0..=36).zip(before) {
        let after = ramp.planned_milli_at(secs(t));
        let expected = planned / 2;
        if after.abs_diff(expected) > 1 {
            return Err(ConfigError::from(format!(
                "t={}: {} milli, expected {}",
                t, after, expected
            )));
        }
    }
    Ok(())
}

#[test]
fn rescale_rejects_negative_and_nan() -> Result<(), ConfigError> {
    let mut scenario = single_ramp_scenario(reference_ramp())?;
    scenario.rescale_by_ratio(f64::NAN);
    if scenario.max_concurrency() != 0 {
        return Err(ConfigError::from("NaN ratio should zero the scenario"));
    }
    let mut scenario = single_ramp_scenario(reference_ramp())?;
    scenario.rescale_by_ratio(-2.0);
    if scenario.max_concurrency() != 0 {
        return Err(ConfigError::from("Negative ratio should zero the scenario"));
    }
    Ok(())
}

#[test]
fn rescale_lands_on_the_exact_quota_across_ramps() -> Result<(), ConfigError> {
    let mut scenario = Scenario::new("s");
    scenario.add_navigation(NavigationPlan::new(
        "a",
        "think",
        vec![
            Ramp::new(secs(0), 5, secs(0), secs(10), secs(0)),
            Ramp::new(secs(0), 5, secs(0), secs(10), secs(0)),
        ],
    ))?;
    // 10 * 0.3 would round each ramp's 1.5 up to 2
    let quota = scenario.rescale_by_ratio(0.3);
    if quota != 3 || scenario.max_concurrency() != 3 {
        return Err(ConfigError::from(format!(
            "Expected 3 peckers, got {}",
            scenario.max_concurrency()
        )));
    }
    if scenario.planned_concurrency_at("a", secs(5)) != 3 {
        return Err(ConfigError::from("Expected 3 peckers on the plateau"));
    }
    let targets: Vec<u64> = scenario
        .navigation("a")
        .map(|nav| nav.ramps.iter().map(Ramp::target).collect())
        .unwrap_or_default();
    if targets != [2, 1] {
        return Err(ConfigError::from(format!("Unexpected targets {:?}", targets)));
    }
    Ok(())
}

#[test]
fn passive_windows_start_in_order_and_stop_oldest_first() -> Result<(), ConfigError> {
    let ramp = Ramp::new(secs(2), 4, secs(4), secs(10), secs(8));
    let windows = ramp.windows();
    let expected = [
        Window {
            start: secs(3),
            stop: secs(18),
        },
        Window {
            start: secs(4),
            stop: secs(20),
        },
        Window {
            start: secs(5),
            stop: secs(22),
        },
        Window {
            start: secs(6),
            stop: secs(24),
        },
    ];
    if windows != expected {
        return Err(ConfigError::from(format!("Unexpected windows {:?}", windows)));
    }
    Ok(())
}

#[test]
fn scenario_aggregates_navigations() -> Result<(), ConfigError> {
    let mut scenario = Scenario::new("checkout");
    scenario.add_navigation(NavigationPlan::new(
        "browse",
        "think",
        vec![reference_ramp(), Ramp::new(secs(30), 2, secs(0), secs(30), secs(0))],
    ))?;
    scenario.add_navigation(NavigationPlan::new(
        "buy",
        "think",
        vec![Ramp::new(secs(0), 3, secs(0), secs(10), secs(0))],
    ))?;

    if scenario.duration() != secs(60) {
        return Err(ConfigError::from("Duration should be the longest ramp"));
    }
    if scenario.max_concurrency() != 15 {
        return Err(ConfigError::from("Max concurrency should sum targets"));
    }
    // overlapping ramps add up
    if scenario.planned_concurrency_at("browse", secs(32)) != 8 {
        return Err(ConfigError::from("Expected 6 + 2 peckers at t=32"));
    }
    if scenario.planned_concurrency_at("missing", secs(1)) != 0 {
        return Err(ConfigError::from("Unknown navigation should plan zero"));
    }
    Ok(())
}

#[test]
fn duplicate_navigation_names_are_rejected() -> Result<(), ConfigError> {
    let mut scenario = Scenario::new("s");
    scenario.add_navigation(NavigationPlan::new("a", "think", vec![reference_ramp()]))?;
    match scenario.add_navigation(NavigationPlan::new("a", "think", vec![reference_ramp()])) {
        Err(ConfigError::DuplicateNavigation { name }) if name == "a" => Ok(()),
        _ => Err(ConfigError::from("Expected duplicate rejection")),
    }
}

#[test]
fn rescale_to_targets_total_and_clamps() -> Result<(), ConfigError> {
    let mut scenario = Scenario::new("s");
    scenario.add_navigation(NavigationPlan::new(
        "a",
        "think",
        vec![Ramp::new(secs(0), 10, secs(0), secs(5), secs(0))],
    ))?;
    scenario.add_navigation(NavigationPlan::new(
        "b",
        "think",
        vec![Ramp::new(secs(0), 30, secs(0), secs(5), secs(0))],
    ))?;

    let mut half = scenario.clone();
    half.rescale_to(20, 1_000.0);
    if half.max_concurrency() != 20 {
        return Err(ConfigError::from("Expected 20 peckers after rescale"));
    }
    if half.duration() != scenario.duration() {
        return Err(ConfigError::from("Rescale changed the duration"));
    }

    let mut clamped = scenario.clone();
    let ratio = clamped.rescale_to(1_000_000, 2.0);
    if ratio.to_bits() != 2.0f64.to_bits() {
        return Err(ConfigError::from("Ratio should clamp to the maximum"));
    }
    if clamped.max_concurrency() != 80 {
        return Err(ConfigError::from("Expected 80 peckers after clamped rescale"));
    }

    if clamp_ratio(f64::NAN, 10.0).to_bits() != 0.0f64.to_bits() {
        return Err(ConfigError::from("NaN ratio should clamp to zero"));
    }
    Ok(())
}

#[test]
fn parse_scenario_file_with_defaults() -> Result<(), ConfigError> {
    let content = r#"
[scenarios.smoke.navigations.home]
kind = "http"
max_iterations = 3
options = { url = "http://127.0.0.1:8080/" }

[[scenarios.smoke.navigations.home.ramps]]
peckers = 4
ramp_up = "2s"
load_duration = 10
ramp_down = "500ms"

[[scenarios.smoke.navigations.home.ramps]]
initial_delay = "1m"

[scenarios.other.navigations.idle]
kind = "think"
[[scenarios.other.navigations.idle.ramps]]
"#;
    let scenario = parse_scenario(content, "smoke")?;
    let home = scenario
        .navigation("home")
        .ok_or_else(|| ConfigError::from("Missing home navigation"))?;
    if home.kind != "http" || home.max_iterations != Some(3) {
        return Err(ConfigError::from("Unexpected navigation header"));
    }
    if home.options.get("url").and_then(toml::Value::as_str) != Some("http://127.0.0.1:8080/") {
        return Err(ConfigError::from("Missing url option"));
    }
    let second = home
        .ramps
        .get(1)
        .ok_or_else(|| ConfigError::from("Missing second ramp"))?;
    if second.target() != 1 || second.ramp_up() != secs(30) || second.ramp_down() != secs(10) {
        return Err(ConfigError::from("Second ramp should use defaults"));
    }
    if second.initial_delay() != secs(60) || second.load_duration() != secs(120) {
        return Err(ConfigError::from("Unexpected second ramp phases"));
    }
    if scenario.navigations().count() != 1 {
        return Err(ConfigError::from("Only the selected scenario is loaded"));
    }
    Ok(())
}

#[test]
fn parse_scenario_rejects_unknown_and_empty() -> Result<(), ConfigError> {
    let content = r#"
[scenarios.empty]

[scenarios.noramps.navigations.a]
kind = "think"
"#;
    match parse_scenario(content, "missing") {
        Err(ConfigError::UnknownScenario { .. }) => {}
        _ => return Err(ConfigError::from("Expected unknown scenario")),
    }
    match parse_scenario(content, "empty") {
        Err(ConfigError::ScenarioWithoutNavigations { .. }) => {}
        _ => return Err(ConfigError::from("Expected empty scenario error")),
    }
    match parse_scenario(content, "noramps") {
        Err(ConfigError::NavigationWithoutRamps { .. }) => Ok(()),
        _ => Err(ConfigError::from("Expected missing ramps error")),
    }
}

#[test]
fn parse_scenario_reports_bad_ramp_field() -> Result<(), ConfigError> {
    let content = r#"
[scenarios.s.navigations.a]
kind = "think"
[[scenarios.s.navigations.a.ramps]]
ramp_up = "10 parsecs"
"#;
    match parse_scenario(content, "s") {
        Err(ConfigError::InvalidRamp { field, index, .. }) if field == "ramp_up" && index == 0 => {
            Ok(())
        }
        _ => Err(ConfigError::from("Expected invalid ramp field")),
    }
}
