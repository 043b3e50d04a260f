use crate::*;

use std::io::{ Read, Write };
use std::sync::RwLock;
use std::sync::atomic::{ AtomicBool, Ordering };



pub const SKIP_CHECKS : bool = !config::ENABLE_ASSERTS;



/// One of these sits in a function-local `static` behind every VALIDATE /
/// ASSERT expansion: the call site's identity plus its "permanently
/// disabled" flag. The flag is a relaxed atomic on purpose — it's written at
/// most once, readers tolerate seeing the old value for a moment, and
/// anything stronger would put synchronization on every check in the program.
/// The worst a race can produce is a redundant presentation or two when
/// several threads hit a fresh failure together.

pub struct CheckSite
{
	pub check_string	: &'static str,
		file_path 		: &'static str,
	pub line_number 	: u32,
		disabled 		: AtomicBool,
}

impl CheckSite
{
	pub const fn new(
		check_string : &'static str,
		file_path : &'static str,
		line_number : u32) -> Self
	{
		Self
		{
			check_string,
			file_path,
			line_number,
			disabled : AtomicBool::new(false),
		}
	}

	pub fn file_name(&self) -> &str
	{
		match self.file_path.rfind(std::path::MAIN_SEPARATOR)
		{
			Some(index) 	=> &self.file_path[index + 1..],
			None 			=> self.file_path,
		}
	}

	pub fn is_disabled(&self) -> bool
	{
		self.disabled.load(Ordering::Relaxed)
	}

	// One-way; a disabled site stays quiet until the process restarts

	pub fn disable(&self)
	{
		self.disabled.store(true, Ordering::Relaxed);
	}
}



/// Everything a presenter gets to show about one failed check.

pub struct FailureReport<'a>
{
	pub check_string 	: &'a str,
	pub file_name 		: &'a str,
	pub line_number 	: u32,
	pub function_name 	: &'a str,
	pub message 		: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct PresentOutcome
{
	pub suppress_site 	: bool,
	pub request_break 	: bool,
}

impl PresentOutcome
{
	pub const fn none() -> Self
	{
		Self
		{
			suppress_site 	: false,
			request_break 	: false,
		}
	}
}

/// The presentation collaborator: a dialog box, a console prompt, a CI hook.
/// Whatever gets installed here decides per failure whether to silence the
/// site and whether to stop in the debugger. Without one installed, the
/// built-in presenter picked by config features is used.

pub trait Presenter : Send + Sync
{
	fn present(&self, report : &FailureReport) -> PresentOutcome;
}

lazy_static::lazy_static!
{
	static ref PRESENTER : RwLock<Option<Box<dyn Presenter>>> = RwLock::new(None);
}

pub fn set_presenter(presenter : Box<dyn Presenter>)
{
	if let Ok(mut slot) = PRESENTER.write()
	{
		*slot = Some(presenter);
	}
}

pub fn clear_presenter()
{
	if let Ok(mut slot) = PRESENTER.write()
	{
		*slot = None;
	}
}



/// The decision behind every failed check. Called only after the guarded
/// expression came up false and the site hasn't been disabled yet. Logs the
/// failure (when asked to), presents it, applies a "don't show this again"
/// answer to the site, and says whether the caller should hit a breakpoint —
/// which is only ever true with a debugger actually attached, since breaking
/// without one takes the process down instead of pausing it.

pub fn evaluate_failure(
	site : &CheckSite,
	function_name : &str,
	message : &str,
	should_log : bool) -> bool
{
	if site.is_disabled()
	{
		return false;
	}

	if should_log
	{
		print_failure_header(site, function_name, message);
	}

	let report = FailureReport
	{
		check_string 	: site.check_string,
		file_name 		: site.file_name(),
		line_number 	: site.line_number,
		function_name,
		message,
	};

	let outcome = present(&report);

	if outcome.suppress_site
	{
		site.disable();
	}

	outcome.request_break && debugger::is_attached()
}



/// Alert for a caught panic the caller may want to propagate. Same
/// presentation seam and same per-site suppression as evaluate_failure, but
/// the break/continue answer is reused as the propagate decision, with no
/// debugger gate — resuming an unwind isn't a breakpoint.

pub fn alert_before_rethrow(
	site : &CheckSite,
	function_name : &str,
	message : &str) -> bool
{
	if site.is_disabled()
	{
		return false;
	}

	print_failure_header(site, function_name, message);

	let report = FailureReport
	{
		check_string 	: site.check_string,
		file_name 		: site.file_name(),
		line_number 	: site.line_number,
		function_name,
		message,
	};

	let outcome = present(&report);

	if outcome.suppress_site
	{
		site.disable();
	}

	outcome.request_break
}



fn present(report : &FailureReport) -> PresentOutcome
{
	if let Ok(slot) = PRESENTER.read()
	{
		if let Some(presenter) = slot.as_ref()
		{
			return presenter.present(report);
		}
	}

	match config::PRESENT_MODE
	{
		config::PresentMode::Panic =>
		{
			panic!(
				"panic on failed check: {} @ {}:{}",
				report.check_string,
				report.file_name,
				report.line_number);
		}
		config::PresentMode::LogOnly =>
		{
			// No presentation capability: never suppress, never break

			PresentOutcome::none()
		}
		config::PresentMode::Interactive =>
		{
			present_interactive(report)
		}
	}
}



const DO_BREAK 		: u8 = b'w';
const SKIP_INSTANCE : u8 = b's';
const SKIP_SITE 	: u8 = b'a';
const MUTE_ALL 		: u8 = b'd';

fn present_interactive(_report : &FailureReport) -> PresentOutcome
{
	static CHECKS_MUTED : AtomicBool = AtomicBool::new(false);

	if CHECKS_MUTED.load(Ordering::Relaxed)
	{
		return PresentOutcome::none();
	}

	print_failure_backtrace();

	// Display controls prompt

	print!("\n");
	println!("  [{}] break", char::from(DO_BREAK));
	println!("  [{}] ignore instance", char::from(SKIP_INSTANCE));
	println!("  [{}] ignore future instances", char::from(SKIP_SITE));
	println!("  [{}] ignore all checks", char::from(MUTE_ALL));
	print!  ("  > ");

	let _ = std::io::stdout().flush();

	read_prompt_outcome(&mut std::io::stdin(), &CHECKS_MUTED)
}

// Wait for input to match. The buffer is cleared every pass so a stale key
//  from an earlier read can't match twice, and a stream that has nothing
//  left to give (EOF, redirected stdin) reads as skipping the instance
//  instead of spinning here forever.

fn read_prompt_outcome(input : &mut dyn Read, checks_muted : &AtomicBool) -> PresentOutcome
{
	loop
	{
		let mut input_buffer = [0; 8];

		let read_count = match input.read(&mut input_buffer)
		{
			Ok(count) 	=> count,
			Err(_) 		=> 0,
		};

		if read_count == 0
		{
			return PresentOutcome::none();
		}

		match input_buffer
		{
			[SKIP_INSTANCE, ..] =>
			{
				// Ignore this instance, but ask again next time

				return PresentOutcome::none();
			}
			[SKIP_SITE, ..] =>
			{
				// Ignore this instance and all future ones at this site

				return PresentOutcome
				{
					suppress_site 	: true,
					request_break 	: false,
				};
			}
			[MUTE_ALL, ..] =>
			{
				// Ignore all future checks, process-wide

				checks_muted.store(true, Ordering::Relaxed);

				return PresentOutcome::none();
			}
			[DO_BREAK, ..] =>
			{
				return PresentOutcome
				{
					suppress_site 	: false,
					request_break 	: true,
				};
			}
			_ =>
			{
				// Continue waiting for valid input

				continue;
			}
		}
	}
}



pub fn print_failure_header(site : &CheckSite, function_name : &str, message : &str)
{
	use colored::*;
	eprintln!(
		"{} {}{}{}{} {}{} :: {} {}",
		"🛑 CHECK FAILED ".on_red(),
		"at ".dimmed(),
		site.file_name().dimmed(),
		":".dimmed(),
		format!("{}", site.line_number).dimmed(),
		"in ".dimmed(),
		function_name.dimmed(),
		site.check_string.red(),
		message)
}

pub fn print_failure_backtrace()
{
	use colored::*;

	let backtrace = std::backtrace::Backtrace::force_capture();
	let backtrace_string = format!("{}", backtrace);

	let mut include_frames = false;

	for line in backtrace_string.lines()
	{
		// Ignore this call (and everything downstream) at the start of the trace

		if !include_frames
		{
			if line.contains("print_failure_backtrace")
			{
				include_frames = true;
			}

			continue;
		}

		// Dim internal rust frames, since we generally don't care about them

		let trimmed = line.trim_end();

		if trimmed.contains("/rustc/")
		{
			eprintln!("{}", trimmed.dimmed());
		}
		else
		{
			eprintln!("{}", trimmed);
		}

		// If we've made it out to the main function of the program, end there

		if trimmed.ends_with("::main")
		{
			break;
		}
	}
}



// Tests

#[cfg(test)]
lazy_static::lazy_static!
{
	// Tests below share the process-wide presenter slot

	static ref TEST_LOCK : std::sync::Mutex<()> = std::sync::Mutex::new(());
}

#[cfg(test)]
struct ScriptedPresenter
{
	outcome 	: PresentOutcome,
	presented 	: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl Presenter for ScriptedPresenter
{
	fn present(&self, _report : &FailureReport) -> PresentOutcome
	{
		self.presented.fetch_add(1, Ordering::SeqCst);
		self.outcome
	}
}

#[cfg(test)]
fn install_scripted_presenter(outcome : PresentOutcome) -> std::sync::Arc<std::sync::atomic::AtomicUsize>
{
	let presented = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

	set_presenter(Box::new(ScriptedPresenter
	{
		outcome,
		presented : presented.clone(),
	}));

	presented
}

#[test]
fn test_suppressed_site_never_presents_again()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: true,
		request_break 	: false,
	});

	let site = CheckSite::new("1 == 2", file!(), line!());

	assert!(!evaluate_failure(&site, "test_fn", "first failure", false));
	assert_eq!(presented.load(Ordering::SeqCst), 1);
	assert!(site.is_disabled());

	assert!(!evaluate_failure(&site, "test_fn", "second failure", false));
	assert!(!evaluate_failure(&site, "test_fn", "third failure", false));
	assert_eq!(presented.load(Ordering::SeqCst), 1);

	clear_presenter();
}

#[test]
fn test_no_break_without_debugger()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	if debugger::is_attached()
	{
		// Can't observe the negative case while actually being debugged

		clear_presenter();
		return;
	}

	let presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: false,
		request_break 	: true,
	});

	let site = CheckSite::new("false", file!(), line!());

	assert!(!evaluate_failure(&site, "test_fn", "wants a break", false));
	assert_eq!(presented.load(Ordering::SeqCst), 1);
	assert!(!site.is_disabled());

	clear_presenter();
}

#[test]
fn test_undecided_presenter_leaves_site_armed()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let presented = install_scripted_presenter(PresentOutcome::none());

	let site = CheckSite::new("x > 0", file!(), line!());

	assert!(!evaluate_failure(&site, "test_fn", "once", false));
	assert!(!evaluate_failure(&site, "test_fn", "twice", false));

	// Without a suppress answer the site presents every time

	assert_eq!(presented.load(Ordering::SeqCst), 2);
	assert!(!site.is_disabled());

	clear_presenter();
}

#[cfg(not(any(feature="panic_on_failures", feature="interactive_failures")))]
#[test]
fn test_log_only_default_never_suppresses_or_breaks()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	clear_presenter();

	let site = CheckSite::new("a != b", file!(), line!());

	assert!(!evaluate_failure(&site, "test_fn", "no presenter installed", false));
	assert!(!site.is_disabled());
}

#[test]
fn test_rethrow_alert_suppression()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: true,
		request_break 	: true,
	});

	let site = CheckSite::new("unhandled panic", file!(), line!());

	// Propagation answer comes straight from the presenter, no debugger gate

	assert!(alert_before_rethrow(&site, "test_fn", "worker panicked"));
	assert!(site.is_disabled());

	// Disabled site swallows silently, without presenting

	assert!(!alert_before_rethrow(&site, "test_fn", "worker panicked again"));
	assert_eq!(presented.load(Ordering::SeqCst), 1);

	clear_presenter();
}

#[test]
fn test_validate_macro_reuses_one_site()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: true,
		request_break 	: false,
	});

	fn poke(value : i32)
	{
		VALIDATE!{ value > 0, "expected positive, found {}", value }
	}

	poke(-1);
	poke(-2);
	poke(-3);

	// The expansion's static site was suppressed on the first failure

	assert_eq!(presented.load(Ordering::SeqCst), 1);

	clear_presenter();
}

#[cfg(not(feature="enable_asserts"))]
#[test]
fn test_disabled_assert_skips_expression()
{
	let mut evaluated = false;

	// The guarded expression must not run when the ASSERT family is
	//  compiled out

	ASSERT!{ { evaluated = true; false }, "never shown" }

	assert!(!evaluated);
}

#[cfg(feature="enable_asserts")]
#[test]
fn test_enabled_assert_presents()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: true,
		request_break 	: false,
	});

	let mut evaluated = false;

	ASSERT!{ { evaluated = true; false }, "assert active" }

	assert!(evaluated);
	assert_eq!(presented.load(Ordering::SeqCst), 1);

	clear_presenter();
}

#[test]
fn test_rethrow_macro_swallows_when_told()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: false,
		request_break 	: false,
	});

	if let Err(payload) = std::panic::catch_unwind(|| panic!("inner failure"))
	{
		RETHROW!{ payload, "caught inner failure" };
	}

	// Reaching here means the panic stayed swallowed

	assert_eq!(presented.load(Ordering::SeqCst), 1);

	clear_presenter();
}

#[test]
fn test_rethrow_macro_propagates_when_told()
{
	let _guard = TEST_LOCK.lock().unwrap_or_else(|error| error.into_inner());

	let _presented = install_scripted_presenter(PresentOutcome
	{
		suppress_site 	: false,
		request_break 	: true,
	});

	let relayed = std::panic::catch_unwind(||
	{
		if let Err(payload) = std::panic::catch_unwind(|| panic!("inner failure"))
		{
			RETHROW!{ payload, "relaying inner failure" };
		}
	});

	assert!(relayed.is_err());

	clear_presenter();
}

#[cfg(not(target_os="windows"))]
#[test]
fn test_file_name_trims_path()
{
	let site = CheckSite::new("true", "some/long/path/widget.rs", 7);

	assert_eq!(site.file_name(), "widget.rs");
}

// Hands the prompt loop one key per read call, then runs dry

#[cfg(test)]
struct KeyFeed
{
	keys : std::collections::VecDeque<u8>,
}

#[cfg(test)]
impl Read for KeyFeed
{
	fn read(&mut self, buffer : &mut [u8]) -> std::io::Result<usize>
	{
		match self.keys.pop_front()
		{
			Some(key) =>
			{
				buffer[0] = key;
				Ok(1)
			}
			None => Ok(0),
		}
	}
}

#[test]
fn test_prompt_eof_skips_instance()
{
	let mut feed = KeyFeed { keys: std::collections::VecDeque::new() };
	let muted = AtomicBool::new(false);

	let outcome = read_prompt_outcome(&mut feed, &muted);

	assert!(!outcome.suppress_site);
	assert!(!outcome.request_break);
	assert!(!muted.load(Ordering::Relaxed));
}

#[test]
fn test_prompt_key_handling()
{
	let muted = AtomicBool::new(false);

	// An unknown key is ignored and the next read starts clean

	let mut feed = KeyFeed { keys: std::collections::VecDeque::from([b'z', SKIP_SITE]) };
	let outcome = read_prompt_outcome(&mut feed, &muted);

	assert!(outcome.suppress_site);
	assert!(!outcome.request_break);

	let mut feed = KeyFeed { keys: std::collections::VecDeque::from([DO_BREAK]) };
	let outcome = read_prompt_outcome(&mut feed, &muted);

	assert!(outcome.request_break);
	assert!(!outcome.suppress_site);

	let mut feed = KeyFeed { keys: std::collections::VecDeque::from([MUTE_ALL]) };
	let outcome = read_prompt_outcome(&mut feed, &muted);

	assert!(!outcome.suppress_site);
	assert!(!outcome.request_break);
	assert!(muted.load(Ordering::Relaxed));
}
