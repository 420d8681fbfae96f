use crate::util::constants::*;
use crate::util::conversions;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use strum_macros::EnumString;

/// The collector algorithm.
#[derive(Copy, Clone, EnumString, Debug, PartialEq, Eq)]
pub enum PlanSelector {
    /// Generational copying young collection plus full mark-sweep-compact.
    Generational,
    /// Allocation only. Allocation fails once the heap is exhausted.
    NoGC,
}

/// A size in bytes, parsed from strings like `4096`, `64K`, `32M` or `1G`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemorySize(pub usize);

impl FromStr for MemorySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        conversions::parse_byte_size(s)
            .map(MemorySize)
            .ok_or_else(|| format!("Cannot parse {:?} as a size in bytes", s))
    }
}

impl Deref for MemorySize {
    type Target = usize;
    fn deref(&self) -> &usize {
        &self.0
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which GC trigger policy decides when a background collection is due.
///
/// The string forms are `fixed`, `threshold`, `adaptive`, `never` and `nth:<N>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GCTriggerSelector {
    /// Collect only when an allocation fails.
    FixedHeapSize,
    /// Collect in the background when occupancy crosses a target footprint
    /// derived from the live size after the last full GC.
    HeapThreshold,
    /// Like `HeapThreshold`, but the target is smoothed over recent GCs.
    Adaptive,
    /// Request a young GC on every N-th allocation. For debugging.
    NthAlloc(usize),
    /// Never request a background GC.
    Never,
}

impl FromStr for GCTriggerSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::FixedHeapSize),
            "threshold" => Ok(Self::HeapThreshold),
            "adaptive" => Ok(Self::Adaptive),
            "never" => Ok(Self::Never),
            _ => {
                if let Some(n) = s.strip_prefix("nth:") {
                    let n: usize = n
                        .parse()
                        .map_err(|_| format!("Cannot parse the count in {:?}", s))?;
                    if n == 0 {
                        return Err("nth:<N> requires N > 0".to_string());
                    }
                    Ok(Self::NthAlloc(n))
                } else {
                    Err(format!("Unknown GC trigger {:?}", s))
                }
            }
        }
    }
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])* $name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Heap options. Create them with `Options::default()`, then adjust them through
        /// environment variables (`GENGC_<NAME>`) or `set_from_string` before building the heap.
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }

        impl Options {
            /// Set an option from its string representation. Returns false and keeps the old
            /// value if the key is unknown, or the value cannot be parsed or is invalid.
            pub fn set_from_string(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(typed_val) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(&typed_val);
                        if is_valid {
                            self.$name = typed_val;
                        } else {
                            eprintln!("Warn: unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        eprintln!("Warn: unable to set {}={:?}. Can't parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        eprintln!("Warn: unknown option {}={:?}.", s, val);
                        false
                    }
                }
            }

            /// Read every environment variable of the form `GENGC_<OPTION_NAME>` and apply it.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "GENGC_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_string(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }

        impl Default for Options {
            fn default() -> Self {
                Options {
                    $($name: $default),*
                }
            }
        }
    ]
}

options! {
    /// The collector algorithm.
    plan:                    PlanSelector      [always_valid] = PlanSelector::Generational,
    /// Number of GC worker threads used for parallel marking and evacuation.
    threads:                 usize             [|v: &usize| *v > 0] = num_cpus::get(),
    /// The heap budget. All regions come out of one reservation of this size.
    heap_size:               MemorySize        [|v: &MemorySize| v.0 >= 4 * BYTES_IN_MBYTE] = MemorySize(256 * BYTES_IN_MBYTE),
    /// log2 of the region size.
    log_region_size:         u8                [|v: &u8| (MIN_LOG_REGION_SIZE..=MAX_LOG_REGION_SIZE).contains(v)] = DEFAULT_LOG_REGION_SIZE,
    /// Eden may grow to this many bytes before a young GC is needed.
    young_size:              MemorySize        [|v: &MemorySize| v.0 > 0] = MemorySize(32 * BYTES_IN_MBYTE),
    /// Survivor regions beyond this count cause early promotion.
    max_survivor_regions:    usize             [|v: &usize| *v > 0] = 4,
    /// The size of a thread-local allocation buffer.
    tlab_size:               MemorySize        [|v: &MemorySize| v.0 >= BYTES_IN_KBYTE && conversions::raw_is_aligned(v.0, BYTES_IN_WORD)] = MemorySize(32 * BYTES_IN_KBYTE),
    /// Requests of at least this many bytes go to the humongous space. Zero means half a region.
    humongous_threshold:     MemorySize        [always_valid] = MemorySize(0),
    /// Non-humongous requests of at least this many bytes are allocated directly in tenured space.
    /// Zero means an eighth of a region.
    large_object_threshold:  MemorySize        [always_valid] = MemorySize(0),
    /// The number of young GCs an object survives before it is promoted.
    tenuring_threshold:      u8                [|v: &u8| (1..=MAX_OBJECT_AGE).contains(v)] = 3,
    /// The background GC trigger.
    gc_trigger:              GCTriggerSelector [always_valid] = GCTriggerSelector::HeapThreshold,
    /// Registered native bytes since the last GC that cause a background full GC.
    native_gc_watermark:     MemorySize        [|v: &MemorySize| v.0 > 0] = MemorySize(64 * BYTES_IN_MBYTE),
    /// Should full GCs mark concurrently with the mutators?
    concurrent_marking:      bool              [always_valid] = false,
    /// Should the requesting thread run GC cycles itself instead of the controller thread?
    run_gc_in_place:         bool              [always_valid] = false,
    /// Should an explicit GC request collect the full heap?
    full_heap_system_gc:     bool              [always_valid] = true,
    /// Should we ignore explicit GC requests?
    ignore_explicit_gc:      bool              [always_valid] = false,
    /// Tenured regions with a live ratio (in percent) below this are compacted, the rest are swept.
    compact_threshold:       usize             [|v: &usize| *v <= 100] = 50,
    /// Interval of the periodic young GC hint in milliseconds. Zero disables it.
    periodic_gc_interval_ms: u64               [always_valid] = 0,
    /// Verify the heap before and after every GC.
    verify_heap:             bool              [always_valid] = false,
    /// Panic when heap verification finds a problem.
    fail_on_verification:    bool              [always_valid] = true,
}

impl Options {
    /// Set options in bulk from a string of space-separated `key=value` pairs.
    /// Every pair is applied even if an earlier one fails. Returns true if all succeeded.
    pub fn set_bulk_from_string(&mut self, options: &str) -> bool {
        let mut all_ok = true;
        for opt in options.split_ascii_whitespace() {
            let ok = match opt.split_once('=') {
                Some((key, val)) => self.set_from_string(key, val),
                None => {
                    eprintln!("Warn: option {:?} is not a key=value pair.", opt);
                    false
                }
            };
            all_ok &= ok;
        }
        all_ok
    }

    pub fn region_size(&self) -> usize {
        1 << self.log_region_size
    }

    /// The effective humongous threshold in bytes, always within (0, region size].
    pub fn humongous_threshold_bytes(&self) -> usize {
        let region_size = self.region_size();
        match *self.humongous_threshold {
            0 => region_size / 2,
            v => v.min(region_size),
        }
    }

    /// The effective large object threshold in bytes, never above the humongous threshold.
    pub fn large_object_threshold_bytes(&self) -> usize {
        let t = match *self.large_object_threshold {
            0 => self.region_size() / 8,
            v => v,
        };
        t.min(self.humongous_threshold_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{serial_test, with_cleanup};

    #[test]
    fn no_env_var() {
        serial_test(|| {
            let mut options = Options::default();
            options.read_env_var_settings();
            assert_eq!(options.tenuring_threshold, 3);
            assert_eq!(options.plan, PlanSelector::Generational);
        })
    }

    #[test]
    fn with_valid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("GENGC_HEAP_SIZE", "64M");
                    std::env::set_var("GENGC_CONCURRENT_MARKING", "true");

                    let mut options = Options::default();
                    options.read_env_var_settings();
                    assert_eq!(*options.heap_size, 64 << 20);
                    assert!(options.concurrent_marking);
                },
                || {
                    std::env::remove_var("GENGC_HEAP_SIZE");
                    std::env::remove_var("GENGC_CONCURRENT_MARKING");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_value() {
        serial_test(|| {
            with_cleanup(
                || {
                    // out of range, so we keep the default
                    std::env::set_var("GENGC_TENURING_THRESHOLD", "16");

                    let mut options = Options::default();
                    options.read_env_var_settings();
                    assert_eq!(options.tenuring_threshold, 3);
                },
                || {
                    std::env::remove_var("GENGC_TENURING_THRESHOLD");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_key() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("GENGC_ABC", "42");
                    let mut options = Options::default();
                    options.read_env_var_settings();
                    assert_eq!(options.tenuring_threshold, 3);
                },
                || {
                    std::env::remove_var("GENGC_ABC");
                },
            )
        })
    }

    #[test]
    fn set_bulk() {
        let mut options = Options::default();
        assert!(options.set_bulk_from_string("threads=2 gc_trigger=nth:10 plan=NoGC"));
        assert_eq!(options.threads, 2);
        assert_eq!(options.gc_trigger, GCTriggerSelector::NthAlloc(10));
        assert_eq!(options.plan, PlanSelector::NoGC);

        assert!(!options.set_bulk_from_string("threads=0 verify_heap=true"));
        assert_eq!(options.threads, 2);
        assert!(options.verify_heap);
    }

    #[test]
    fn trigger_selector_parsing() {
        assert_eq!(
            "never".parse::<GCTriggerSelector>(),
            Ok(GCTriggerSelector::Never)
        );
        assert!("nth:0".parse::<GCTriggerSelector>().is_err());
        assert!("nth:x".parse::<GCTriggerSelector>().is_err());
        assert!("sometimes".parse::<GCTriggerSelector>().is_err());
    }

    #[test]
    fn derived_thresholds() {
        let mut options = Options::default();
        options.log_region_size = 16;
        assert_eq!(options.humongous_threshold_bytes(), 32 << 10);
        assert_eq!(options.large_object_threshold_bytes(), 8 << 10);

        options.humongous_threshold = MemorySize(1 << 20);
        assert_eq!(options.humongous_threshold_bytes(), 64 << 10);

        options.humongous_threshold = MemorySize(4096);
        assert_eq!(options.large_object_threshold_bytes(), 4096);
    }
}
