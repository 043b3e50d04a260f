// Breaking with no debugger attached doesn't pause the process, it kills it,
//  so every potential break gets gated on this check first.



#[cfg(target_os="linux")]
mod platform
{
	// A process being traced shows up as a nonzero TracerPid in
	//  /proc/self/status.

	pub fn query_attached() -> bool
	{
		let status = match std::fs::read_to_string("/proc/self/status")
		{
			Ok(text) 	=> text,
			Err(_) 		=> return false,
		};

		for line in status.lines()
		{
			if let Some(rest) = line.strip_prefix("TracerPid:")
			{
				return match rest.trim().parse::<u32>()
				{
					Ok(tracer_pid) 	=> tracer_pid != 0,
					Err(_) 			=> false,
				};
			}
		}

		false
	}
}

#[cfg(target_os="windows")]
mod platform
{
	#[link(name="kernel32")]
	extern "system"
	{
		fn IsDebuggerPresent() -> i32;
	}

	pub fn query_attached() -> bool
	{
		unsafe { IsDebuggerPresent() != 0 }
	}
}

// TODO macOS detection via sysctl KERN_PROC + P_TRACED

#[cfg(not(any(target_os="linux", target_os="windows")))]
mod platform
{
	pub fn query_attached() -> bool
	{
		false
	}
}



// On Windows the query is a PEB read, cheap enough to repeat, so a debugger
//  attached mid-run is picked up. The procfs read on Linux is too slow for
//  something that gates every potential break; that answer is cached the
//  first time it's needed.

#[cfg(target_os="windows")]
pub fn is_attached() -> bool
{
	platform::query_attached()
}

#[cfg(not(target_os="windows"))]
lazy_static::lazy_static!
{
	static ref ATTACHED_AT_FIRST_QUERY : bool = platform::query_attached();
}

#[cfg(not(target_os="windows"))]
pub fn is_attached() -> bool
{
	*ATTACHED_AT_FIRST_QUERY
}



// Tests

#[cfg(target_os="linux")]
#[test]
fn test_not_attached_under_test_runner()
{
	// Nothing traces the test process in a normal run

	assert!(!is_attached());
	assert!(!is_attached());
}
