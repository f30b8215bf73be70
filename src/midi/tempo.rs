//! Tick to wall-clock conversion.
//!
//! A [`TempoMap`] is a piecewise-linear function from ticks to
//! microseconds. Each segment starts at a tempo change and carries the
//! absolute time of its first tick, so a lookup is one binary search and
//! one multiplication no matter how many tempo changes precede it.

/// Tempo in effect before the first tempo event (120 BPM).
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// How ticks relate to time, taken from the file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timebase {
    /// Ticks per quarter note; tempo events set the quarter-note length.
    Metrical { ticks_per_quarter: u16 },
    /// Fixed ticks per second (SMPTE frames x subframes); tempo is ignored.
    Timecode { ticks_per_second: f64 },
}

impl Timebase {
    /// Builds the timebase from a `midly` header timing field.
    pub fn from_midly(timing: midly::Timing) -> Self {
        match timing {
            midly::Timing::Metrical(tpq) => Timebase::Metrical {
                ticks_per_quarter: tpq.as_int().max(1),
            },
            midly::Timing::Timecode(fps, subframes) => Timebase::Timecode {
                ticks_per_second: (fps.as_f32() as f64 * subframes.max(1) as f64).max(1.0),
            },
        }
    }
}

/// One constant-tempo stretch of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TempoSegment {
    /// First tick governed by this tempo.
    tick: u64,
    /// Absolute time of `tick` in microseconds.
    micros: u64,
    /// Quarter-note length in microseconds.
    micros_per_quarter: u32,
}

/// Piecewise tick-to-microsecond conversion honoring every tempo change.
#[derive(Debug, Clone)]
pub struct TempoMap {
    timebase: Timebase,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// Creates a map with the default tempo and no changes.
    pub fn new(timebase: Timebase) -> Self {
        Self {
            timebase,
            segments: vec![TempoSegment {
                tick: 0,
                micros: 0,
                micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            }],
        }
    }

    /// Builds a map from `(tick, micros_per_quarter)` tempo events.
    ///
    /// Events may come from any track and in any order. When several
    /// changes share a tick, the last one in the input wins.
    pub fn from_changes(timebase: Timebase, mut changes: Vec<(u64, u32)>) -> Self {
        let mut map = Self::new(timebase);
        if matches!(timebase, Timebase::Timecode { .. }) {
            return map;
        }

        changes.sort_by_key(|&(tick, _)| tick);
        for (tick, micros_per_quarter) in changes {
            let micros_per_quarter = micros_per_quarter.max(1);
            let micros = map.tick_to_micros(tick);
            match map.segments.last_mut() {
                Some(last) if last.tick == tick => last.micros_per_quarter = micros_per_quarter,
                _ => map.segments.push(TempoSegment {
                    tick,
                    micros,
                    micros_per_quarter,
                }),
            }
        }
        map
    }

    /// Returns the timebase this map was built with.
    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    /// Number of distinct tempo segments (1 when the tempo never changes).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Quarter-note length in effect at `tick`.
    pub fn micros_per_quarter_at(&self, tick: u64) -> u32 {
        self.segment_at(tick).micros_per_quarter
    }

    /// Converts an absolute tick position to microseconds.
    pub fn tick_to_micros(&self, tick: u64) -> u64 {
        match self.timebase {
            Timebase::Metrical { ticks_per_quarter } => {
                let segment = self.segment_at(tick);
                let delta = (tick - segment.tick) as u128;
                let offset =
                    delta * segment.micros_per_quarter as u128 / ticks_per_quarter as u128;
                segment
                    .micros
                    .saturating_add(u64::try_from(offset).unwrap_or(u64::MAX))
            }
            Timebase::Timecode { ticks_per_second } => {
                (tick as f64 * 1_000_000.0 / ticks_per_second).round() as u64
            }
        }
    }

    fn segment_at(&self, tick: u64) -> &TempoSegment {
        // segments[0] starts at tick 0, so the index is always >= 1
        let index = self.segments.partition_point(|s| s.tick <= tick);
        &self.segments[index.saturating_sub(1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRICAL: Timebase = Timebase::Metrical {
        ticks_per_quarter: 480,
    };

    #[test]
    fn test_default_tempo() {
        let map = TempoMap::new(METRICAL);
        // At 120 BPM, one beat = 0.5 seconds
        assert_eq!(map.tick_to_micros(480), 500_000);
        assert_eq!(map.tick_to_micros(1920), 2_000_000);
    }

    #[test]
    fn test_tempo_change_mid_file() {
        // Two beats at 120 BPM, then 60 BPM
        let map = TempoMap::from_changes(METRICAL, vec![(960, 1_000_000), (0, 500_000)]);
        assert_eq!(map.segment_count(), 2);
        assert_eq!(map.tick_to_micros(960), 1_000_000);
        assert_eq!(map.tick_to_micros(1440), 2_000_000);
        assert_eq!(map.micros_per_quarter_at(100), 500_000);
        assert_eq!(map.micros_per_quarter_at(960), 1_000_000);
    }

    #[test]
    fn test_last_change_at_same_tick_wins() {
        let map = TempoMap::from_changes(METRICAL, vec![(0, 250_000), (0, 1_000_000)]);
        assert_eq!(map.segment_count(), 1);
        assert_eq!(map.tick_to_micros(480), 1_000_000);
    }

    #[test]
    fn test_extreme_positions_saturate() {
        let slow = Timebase::Metrical {
            ticks_per_quarter: 1,
        };
        let map = TempoMap::from_changes(slow, vec![(0, 0xFF_FFFF), (u64::MAX / 4, 500_000)]);
        let ticks = [0, 1_000, u64::MAX / 8, u64::MAX / 4, u64::MAX / 2, u64::MAX];
        let times: Vec<u64> = ticks.iter().map(|&t| map.tick_to_micros(t)).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "{:?}", times);
        assert_eq!(map.tick_to_micros(u64::MAX), u64::MAX);
        assert_eq!(map.tick_to_micros(1_000), 16_777_215_000);
    }

    #[test]
    fn test_timecode_ignores_tempo() {
        let timebase = Timebase::Timecode {
            ticks_per_second: 25.0 * 40.0,
        };
        let map = TempoMap::from_changes(timebase, vec![(0, 1_000_000)]);
        assert_eq!(map.tick_to_micros(1000), 1_000_000);
        assert_eq!(map.tick_to_micros(1), 1_000);
    }
}
