//! Unit tests for msim-core.

use std::sync::Arc;

use crate::buffered::{Buffered, BufferedBase};
use crate::config::{MutexStrategy, SimulationConfig, WorkGroupConfig};
use crate::time::{half_hour_window, random_time_in_window, DailyTime, Tick, TickClock};
use crate::{EntityId, SimRng, TravelMode};

// ── Buffered cells ────────────────────────────────────────────────────────────

mod buffered_tests {
    use super::*;

    #[test]
    fn readers_see_committed_until_flip() {
        let cell = Buffered::new(10i64);
        cell.set(20);
        assert_eq!(cell.get(), 10, "tentative write must not be visible");
        cell.flip();
        assert_eq!(cell.get(), 20);
    }

    #[test]
    fn double_flip_is_idempotent() {
        let cell = Buffered::new(1u32);
        cell.set(2);
        cell.flip();
        cell.flip();
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn force_sets_both_copies() {
        let cell = Buffered::new(0.0f64);
        cell.force(7.5);
        assert_eq!(cell.get(), 7.5);
        cell.flip();
        assert_eq!(cell.get(), 7.5, "flip after force must not regress");
    }

    #[test]
    fn heterogeneous_cells_flip_through_trait_objects() {
        let a = Buffered::shared(1u64);
        let b = Buffered::shared(-1.5f64);
        a.set(2);
        b.set(2.5);
        let list: Vec<Arc<dyn BufferedBase>> = vec![a.clone(), b.clone()];
        for cell in &list {
            cell.flip();
        }
        assert_eq!(a.get(), 2);
        assert_eq!(b.get(), 2.5);
    }
}

// ── Half-hour windows ─────────────────────────────────────────────────────────

mod window_tests {
    use super::*;

    #[test]
    fn window_boundaries() {
        assert_eq!(half_hour_window(3 * 3_600), 3.25);
        assert_eq!(half_hour_window(3 * 3_600 + 1_799), 3.25);
        assert_eq!(half_hour_window(3 * 3_600 + 1_800), 3.75);
        assert_eq!(half_hour_window(23 * 3_600 + 1_800), 23.75);
        assert_eq!(half_hour_window(0), 24.25);
    }

    #[test]
    fn pre_three_am_wraps_to_next_day() {
        assert_eq!(half_hour_window(2 * 3_600 + 1_800), 26.75);
        assert_eq!(half_hour_window(1_800), 24.75);
    }

    #[test]
    fn random_time_lands_inside_its_window() {
        let mut rng = SimRng::new(7);
        for _ in 0..200 {
            let t = random_time_in_window(&mut rng, 4.75, false);
            let secs = t.offset_secs();
            assert!((4 * 3_600 + 1_800..5 * 3_600).contains(&secs), "got {t}");
        }
    }

    #[test]
    fn first_fifteen_restriction_holds() {
        let mut rng = SimRng::new(8);
        for _ in 0..200 {
            let t = random_time_in_window(&mut rng, 9.25, true);
            let secs = t.offset_secs();
            assert!((9 * 3_600..9 * 3_600 + 15 * 60).contains(&secs), "got {t}");
        }
    }

    #[test]
    fn post_midnight_window_wraps_hour() {
        let mut rng = SimRng::new(9);
        let t = random_time_in_window(&mut rng, 24.25, false);
        assert!(t.offset_secs() < 1_800, "24.25 is 00:00-00:29, got {t}");
    }
}

// ── DailyTime ─────────────────────────────────────────────────────────────────

mod daily_time_tests {
    use super::*;

    #[test]
    fn parses_hms() {
        let t = DailyTime::parse("08:30:15").unwrap();
        assert_eq!(t.offset_secs(), 8 * 3_600 + 30 * 60 + 15);
        assert_eq!(t.to_string(), "08:30:15");
    }

    #[test]
    fn parses_date_prefixed_format() {
        let t = DailyTime::parse("01-09-2012 18:45").unwrap();
        assert_eq!(t.offset_secs(), 18 * 3_600 + 45 * 60);
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert!(DailyTime::parse("24:00:00").is_err());
        assert!(DailyTime::parse("12:61:00").is_err());
        assert!(DailyTime::parse("noon").is_err());
        assert!(DailyTime::parse("2012-09-01T18:45").is_err());
    }
}

// ── Tick / clock ──────────────────────────────────────────────────────────────

mod clock_tests {
    use super::*;

    #[test]
    fn alignment_respects_granularity() {
        assert!(Tick(0).is_aligned(5));
        assert!(!Tick(3).is_aligned(5));
        assert!(Tick(10).is_aligned(5));
        assert!(Tick(3).is_aligned(1));
    }

    #[test]
    fn clock_tracks_ms() {
        let mut clock = TickClock::new(100, DailyTime::parse("03:00:00").unwrap());
        assert_eq!(clock.now_ms(), 0);
        for _ in 0..25 {
            clock.advance();
        }
        assert_eq!(clock.now_ms(), 2_500);
        assert_eq!(clock.current_tick, Tick(25));
    }

    #[test]
    fn daily_time_advances_from_start() {
        let mut clock = TickClock::new(1_000, DailyTime::parse("03:00:00").unwrap());
        for _ in 0..90 {
            clock.advance();
        }
        assert_eq!(clock.daily_time().to_string(), "03:01:30");
    }
}

// ── Ids / modes / config ──────────────────────────────────────────────────────

#[test]
fn entity_ids_are_monotonic() {
    let a = EntityId::next();
    let b = EntityId::next();
    assert!(b.0 > a.0);
}

#[test]
fn travel_mode_parses_store_strings() {
    assert_eq!(TravelMode::parse("Walk"), Some(TravelMode::Walk));
    assert_eq!(TravelMode::parse("BusTravel"), Some(TravelMode::Bus));
    assert_eq!(TravelMode::parse("Hoverboard"), None);
}

fn minimal_config() -> SimulationConfig {
    SimulationConfig {
        base_gran_ms: 100,
        total_runtime_ticks: 10,
        total_warmup_ticks: 0,
        sim_start_time: "03:00:00".into(),
        seed: 42,
        dynamic_dispatch: true,
        strict_agent_errors: false,
        mutex_strategy: MutexStrategy::Buffered,
        database: String::new(),
        load_interval_secs: 3_600,
        agents_workgroup: WorkGroupConfig::new(2, 1),
        signals_workgroup: WorkGroupConfig::new(1, 5),
        shortest_path_workgroup: WorkGroupConfig::new(1, 10),
        procedures: Default::default(),
        output_dir: None,
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn minimal_config_validates() {
        minimal_config().validate().unwrap();
    }

    #[test]
    fn locked_strategy_rejected() {
        let mut cfg = minimal_config();
        cfg.mutex_strategy = MutexStrategy::Locked;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = minimal_config();
        cfg.signals_workgroup.workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn database_requires_mandatory_procedures() {
        let mut cfg = minimal_config();
        cfg.database = "net.sqlite".into();
        assert!(cfg.validate().is_err(), "node/section procedures missing");

        cfg.procedures.0.insert("node".into(), "get_nodes".into());
        cfg.procedures.0.insert("section".into(), "get_sections".into());
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_procedure_string_means_disabled() {
        let mut cfg = minimal_config();
        cfg.procedures.0.insert("signal".into(), String::new());
        assert_eq!(cfg.procedures.get("signal"), None);
        assert_eq!(cfg.procedures.get("never_set"), None);
    }
}
