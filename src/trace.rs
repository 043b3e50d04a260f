use crate::*;
use crate::category::{ Category, CategoryMap, ExtCategoryMap };

use std::sync::RwLock;
use std::sync::atomic::{ AtomicBool, AtomicI32, AtomicU64, Ordering };



pub const SKIP_TRACES : bool = !config::ENABLE_TRACE;



// Category/volume registry. A trace at volume V for category C is audible
//  iff V is within both C's volume and the master volume. Categories
//  register themselves the first time they're queried, so anything that has
//  traced once can be listed and tuned. Every configuration change bumps
//  CHANGE_COUNT, which is what invalidates the per-site filter caches.

struct CategoryState
{
	name 	: String,
	volume 	: i32,
}

lazy_static::lazy_static!
{
	static ref CATEGORY_TABLE : RwLock<CategoryMap<CategoryState>> =
		RwLock::new(CategoryMap::new());

	static ref SINK : RwLock<Option<Box<dyn TraceSink>>> = RwLock::new(None);
}

static MASTER_VOLUME : AtomicI32 = AtomicI32::new(config::DEFAULT_MASTER_VOLUME);
static CHANGE_COUNT : AtomicU64 = AtomicU64::new(0);

#[cfg(test)]
static QUERY_COUNT : AtomicU64 = AtomicU64::new(0);



pub fn change_count() -> u64
{
	CHANGE_COUNT.load(Ordering::Relaxed)
}

fn bump_change_count()
{
	CHANGE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn trace_enabled(category : &str, volume : i32) -> bool
{
	#[cfg(test)]
	QUERY_COUNT.fetch_add(1, Ordering::SeqCst);

	// The lookup also registers a first-time category, so it happens even
	//  when the master volume already rules the trace out

	let configured = category_volume(category);

	volume <= MASTER_VOLUME.load(Ordering::Relaxed) && volume <= configured
}

pub fn category_volume(category : &str) -> i32
{
	let key = Category::new(category);

	if let Ok(table) = CATEGORY_TABLE.read()
	{
		if let Some(state) = table.get(&key)
		{
			return state.volume;
		}
	}

	// First sighting: register at the default volume so the category shows
	//  up in known_categories(). No change-count bump; the default was
	//  already the answer any cached site would have computed.

	if let Ok(mut table) = CATEGORY_TABLE.write()
	{
		let state = table.entry(key).or_insert_with(|| CategoryState
		{
			name 	: String::from(category),
			volume 	: config::DEFAULT_CATEGORY_VOLUME,
		});

		return state.volume;
	}

	config::DEFAULT_CATEGORY_VOLUME
}

pub fn set_category_volume(category : &str, volume : i32)
{
	let key = Category::new(category);

	if let Ok(mut table) = CATEGORY_TABLE.write()
	{
		table
			.entry(key)
			.and_modify(|state| state.volume = volume)
			.or_insert_with(|| CategoryState
			{
				name 	: String::from(category),
				volume,
			});
	}

	bump_change_count();
}

pub fn master_volume() -> i32
{
	MASTER_VOLUME.load(Ordering::Relaxed)
}

pub fn set_master_volume(volume : i32)
{
	MASTER_VOLUME.store(volume, Ordering::Relaxed);

	bump_change_count();
}

/// Every category that has been traced or configured so far, with its
/// current volume, sorted by name. This is what a console/settings panel
/// lists for tuning.

pub fn known_categories() -> Vec<(String, i32)>
{
	let mut categories = Vec::new();

	if let Ok(table) = CATEGORY_TABLE.read()
	{
		for state in table.values()
		{
			categories.push((state.name.clone(), state.volume));
		}
	}

	categories.sort();

	categories
}



/// One of these sits in a function-local `static` behind every TRACE
/// expansion. Looking the category up on every trace call adds up fast on
/// hot paths, so the last answer is cached here and only recomputed after
/// the registry's change count has moved — which takes an operator action,
/// so it's rare. The two cells are independent relaxed atomics; a thread
/// racing a volume change may act on one stale answer, worth at most one
/// trace line too few or too many, and that's the whole cost.

pub struct TraceSite
{
	change_count 	: AtomicU64,
	enabled 		: AtomicBool,
}

const NEVER_EVALUATED : u64 = u64::MAX;

impl TraceSite
{
	pub const fn new() -> Self
	{
		Self
		{
			change_count 	: AtomicU64::new(NEVER_EVALUATED),
			enabled 		: AtomicBool::new(false),
		}
	}

	pub fn should_trace(&self, category : &str, volume : i32) -> bool
	{
		let current = change_count();
		let seen = self.change_count.swap(current, Ordering::Relaxed);

		if seen != current
		{
			let enabled = trace_enabled(category, volume);
			self.enabled.store(enabled, Ordering::Relaxed);

			return enabled;
		}

		self.enabled.load(Ordering::Relaxed)
	}
}



/// The output collaborator: console, file, debugger output stream. Trace
/// output is best-effort diagnostics; a sink has no way to report failure
/// back into the traced code path.

pub trait TraceSink : Send + Sync
{
	fn emit(&self, line : &str);
}

pub fn set_sink(sink : Box<dyn TraceSink>)
{
	if let Ok(mut slot) = SINK.write()
	{
		*slot = Some(sink);
	}
}

pub fn clear_sink()
{
	if let Ok(mut slot) = SINK.write()
	{
		*slot = None;
	}
}

/// Formats one trace line — thread, category, volume, message, in that
/// order, each bracketed — and forwards it to the installed sink, or to
/// stderr when none is installed.

pub fn emit(category : &str, volume : i32, message : std::fmt::Arguments)
{
	let thread_id = std::thread::current().id();
	let line = format!("<{:?}> <{}> <{}> {}", thread_id, category, volume, message);

	if let Ok(slot) = SINK.read()
	{
		if let Some(sink) = slot.as_ref()
		{
			// A broken sink must never unwind into the traced code path

			let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
				|| sink.emit(&line)));

			return;
		}
	}

	use std::io::Write;
	let _ = writeln!(std::io::stderr(), "{}", line);
}



// Tests

#[cfg(test)]
lazy_static::lazy_static!
{
	// Tests below share the registry, the master volume, and the sink slot

	static ref TEST_LOCK : std::sync::Mutex<()> = std::sync::Mutex::new(());
}

#[cfg(test)]
struct CountingSink
{
	lines : std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl TraceSink for CountingSink
{
	fn emit(&self, line : &str)
	{
		if let Ok(mut lines) = self.lines.lock()
		{
			lines.push(String::from(line));
		}
	}
}

#[cfg(test)]
fn install_counting_sink() -> std::sync::Arc<std::sync::Mutex<Vec<String>>>
{
	let lines = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

	set_sink(Box::new(CountingSink
	{
		lines : lines.clone(),
	}));

	lines
}

#[cfg(test)]
fn sunk_lines(lines : &std::sync::Arc<std::sync::Mutex<Vec<String>>>) -> Vec<String>
{
	lines.lock().map(|lines| lines.clone()).unwrap_or_default()
}

#[test]
fn test_volume_thresholds()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
	set_category_volume("vigil.t.bounds", 3);

	// Equal to the category volume is audible, one above is not

	assert!(trace_enabled("vigil.t.bounds", 3));
	assert!(!trace_enabled("vigil.t.bounds", 4));
	assert!(trace_enabled("vigil.t.bounds", 1));

	// The master volume trumps the category volume

	set_master_volume(2);

	assert!(trace_enabled("vigil.t.bounds", 2));
	assert!(!trace_enabled("vigil.t.bounds", 3));

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
}

#[test]
fn test_unseen_category_defaults()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);

	assert!(trace_enabled("vigil.t.unseen", config::DEFAULT_CATEGORY_VOLUME));
	assert!(!trace_enabled("vigil.t.unseen", config::DEFAULT_CATEGORY_VOLUME + 1));

	// The query registered the category for listing

	let listed = known_categories();

	assert!(listed.contains(&(
		String::from("vigil.t.unseen"),
		config::DEFAULT_CATEGORY_VOLUME)));
}

#[test]
fn test_first_query_above_master_still_registers()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	// Even a query the master volume silences must register the category,
	//  or it never shows up for tuning

	set_master_volume(0);

	assert!(!trace_enabled("vigil.t.loud", 1));

	let listed = known_categories();

	assert!(listed.contains(&(
		String::from("vigil.t.loud"),
		config::DEFAULT_CATEGORY_VOLUME)));

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
}

#[test]
fn test_site_cache_requeries_once_per_change()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
	set_category_volume("vigil.t.cache", 3);

	let site = TraceSite::new();

	let baseline = QUERY_COUNT.load(Ordering::SeqCst);

	// First call computes, the rest ride the cache

	assert!(!site.should_trace("vigil.t.cache", 4));
	assert!(!site.should_trace("vigil.t.cache", 4));
	assert!(!site.should_trace("vigil.t.cache", 4));
	assert_eq!(QUERY_COUNT.load(Ordering::SeqCst), baseline + 1);

	// Raising the volume bumps the change count: exactly one recompute

	set_category_volume("vigil.t.cache", 5);

	assert!(site.should_trace("vigil.t.cache", 4));
	assert!(site.should_trace("vigil.t.cache", 4));
	assert_eq!(QUERY_COUNT.load(Ordering::SeqCst), baseline + 2);
}

#[test]
fn test_false_guard_skips_filter_and_sink()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
	set_category_volume("vigil.t.guard", 5);

	let lines = install_counting_sink();

	fn guarded_trace(flag : bool)
	{
		TRACE_IF_ALWAYS!{ "vigil.t.guard", 2, flag, "guarded message" }
	}

	let baseline = QUERY_COUNT.load(Ordering::SeqCst);

	guarded_trace(false);
	guarded_trace(false);
	guarded_trace(false);

	assert_eq!(sunk_lines(&lines).len(), 0);
	assert_eq!(QUERY_COUNT.load(Ordering::SeqCst), baseline);

	guarded_trace(true);

	assert_eq!(sunk_lines(&lines).len(), 1);

	clear_sink();
}

#[test]
fn test_trace_end_to_end()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
	set_category_volume("io.cache", 3);

	let lines = install_counting_sink();

	fn cache_trace_v3()
	{
		TRACE_ALWAYS!{ "io.cache", 3, "cache hit" }
	}

	fn cache_trace_v4()
	{
		TRACE_ALWAYS!{ "io.cache", 4, "cache miss" }
	}

	cache_trace_v3();
	cache_trace_v4();

	{
		let emitted = sunk_lines(&lines);

		assert_eq!(emitted.len(), 1);
		assert!(emitted[0].contains("<io.cache> <3> cache hit"));
		assert!(emitted[0].starts_with('<'));
	}

	// Opening the category up makes the volume-4 site audible on its next
	//  invocation

	set_category_volume("io.cache", 5);

	cache_trace_v4();

	{
		let emitted = sunk_lines(&lines);

		assert_eq!(emitted.len(), 2);
		assert!(emitted[1].contains("<io.cache> <4> cache miss"));
	}

	clear_sink();
}

#[cfg(not(feature="enable_trace"))]
#[test]
fn test_gated_trace_washes_out()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
	set_category_volume("vigil.t.gated", 9);

	let lines = install_counting_sink();

	TRACE!{ "vigil.t.gated", 1, "should never appear" }

	assert_eq!(sunk_lines(&lines).len(), 0);

	clear_sink();
}

#[cfg(feature="enable_trace")]
#[test]
fn test_gated_trace_active()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	set_master_volume(config::DEFAULT_MASTER_VOLUME);
	set_category_volume("vigil.t.gated", 9);

	let lines = install_counting_sink();

	TRACE!{ "vigil.t.gated", 1, "should appear" }

	assert_eq!(sunk_lines(&lines).len(), 1);

	clear_sink();
}

#[test]
fn test_panicking_sink_is_contained()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	struct PanickySink {}

	impl TraceSink for PanickySink
	{
		fn emit(&self, _line : &str)
		{
			panic!("sink blew up");
		}
	}

	set_sink(Box::new(PanickySink {}));

	// Must return normally; best-effort output never unwinds into callers

	emit("vigil.t.panic", 1, format_args!("boom"));

	clear_sink();
}
