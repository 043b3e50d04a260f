// These macros live in their own library crate so that the debug_break!()
//  breakpoint lands in the source file that wrote the check, rather than in
//  the file that defines the macro. Defining them inside the vigil crate
//  itself makes the debugger stop inside the macro definition whenever a
//  check in vigil's own code fires.
//
//  The expansions refer to the vigil modules (check_internal, trace) by
//  unqualified path, so call sites need `use vigil::*;` in scope. $crate
//  can't help here since it names this crate, which can't depend on vigil.



// NOTE Not using std::intrinsics::breakpoint() since that causes the
//  breakpoint to "appear" in this file, instead of the file where the
//  check is written.

#[cfg(target_arch="x86_64")]
#[macro_export]
macro_rules! debug_break
{
	() => { unsafe { std::arch::asm!("int3"); } }
}

#[cfg(target_arch="aarch64")]
#[macro_export]
macro_rules! debug_break
{
	() => { unsafe { std::arch::asm!("brk #0"); } }
}

#[cfg(not(any(target_arch="x86_64", target_arch="aarch64")))]
#[macro_export]
macro_rules! debug_break
{
	() => { {} }
}



// Resolves to the path of the enclosing function, for failure reports.
//  There is no function!() in std, so read a local item's type name.

#[macro_export]
macro_rules! function_path
{
	() =>
	{{
		fn f() {}
		fn name_of<T>(_item : T) -> &'static str
		{
			std::any::type_name::<T>()
		}

		let full_name = name_of(f);
		full_name.strip_suffix("::f").unwrap_or(full_name)
	}}
}



// Check that never washes out of any build configuration. Each expansion
//  plants one static site token; once a failure is suppressed through the
//  presenter, that site stays quiet for the life of the process.

#[macro_export]
macro_rules! VALIDATE
{
	{ $f_check:expr, $( $e:expr ),*, } =>
	{
		if ($f_check) == false
		{
			// Check has failed...

			static CHECK_SITE : check_internal::CheckSite =
				check_internal::CheckSite::new(
												stringify!($f_check),
												file!(),
												line!());

			if !CHECK_SITE.is_disabled()
			{
				let should_break = check_internal::evaluate_failure(
					&CHECK_SITE,
					$crate::function_path!(),
					&format!($($e),*),
					true);

				if should_break
				{
					$crate::debug_break!();
				}
			}
		}
	};
	{ $f_check:expr, $( $e:expr ),* } =>
	{
		VALIDATE!{ $f_check, $($e,)* };
	};
	{ $f_check:expr } =>
	{
		VALIDATE!{ $f_check, "Failed {}", stringify!($f_check) };
	};
}



// Common macro for validating some code assumption. Checks can be compiled
//  out entirely (based on config features), so shouldn't produce any side
//  effects.

#[macro_export]
macro_rules! ASSERT
{
	{ $f_check:expr, $( $e:expr ),*, } =>
	{
		if check_internal::SKIP_CHECKS
		{
			// Don't even run the check if asserts aren't enabled
		}
		else
		{
			$crate::VALIDATE!{ $f_check, $($e,)* }
		}
	};
	{ $f_check:expr, $( $e:expr ),* } =>
	{
		ASSERT!{ $f_check, $($e,)* };
	};
	{ $f_check:expr } =>
	{
		ASSERT!{ $f_check, "Failed {}", stringify!($f_check) };
	};
}



// Same as ASSERT, but stays active in configurations that compile the
//  ASSERT family out.

#[macro_export]
macro_rules! ASSERT_ALWAYS
{
	{ $( $args:tt )* } =>
	{
		$crate::VALIDATE!{ $($args)* }
	};
}



#[macro_export]
macro_rules! FAIL
{
	{ $( $e:expr ),*, } =>
	{
		ASSERT!{ false, $($e,)* }
	};
	{ $( $e:expr ),* } =>
	{
		FAIL!{ $($e,)* }
	};
}



// Categorized / volumed trace. The guard expression is checked before any
//  filter or formatting work so a false guard costs nearly nothing. Each
//  expansion plants one static filter-cache token.

#[macro_export]
macro_rules! TRACE_IF_ALWAYS
{
	{ $category:expr, $volume:expr, $f_check:expr, $( $e:expr ),*, } =>
	{
		if ($f_check) != false
		{
			static TRACE_SITE : trace::TraceSite = trace::TraceSite::new();

			let volume : i32 = $volume;
			let category : &str = $category;

			if TRACE_SITE.should_trace(category, volume)
			{
				trace::emit(category, volume, format_args!($($e),*));
			}
		}
	};
	{ $category:expr, $volume:expr, $f_check:expr, $( $e:expr ),* } =>
	{
		TRACE_IF_ALWAYS!{ $category, $volume, $f_check, $($e,)* };
	};
}

#[macro_export]
macro_rules! TRACE_ALWAYS
{
	{ $category:expr, $volume:expr, $( $e:expr ),*, } =>
	{
		$crate::TRACE_IF_ALWAYS!{ $category, $volume, true, $($e,)* }
	};
	{ $category:expr, $volume:expr, $( $e:expr ),* } =>
	{
		TRACE_ALWAYS!{ $category, $volume, $($e,)* };
	};
}

#[macro_export]
macro_rules! TRACE_IF
{
	{ $category:expr, $volume:expr, $f_check:expr, $( $e:expr ),*, } =>
	{
		if trace::SKIP_TRACES
		{
			// Traces aren't compiled into this configuration
		}
		else
		{
			$crate::TRACE_IF_ALWAYS!{ $category, $volume, $f_check, $($e,)* }
		}
	};
	{ $category:expr, $volume:expr, $f_check:expr, $( $e:expr ),* } =>
	{
		TRACE_IF!{ $category, $volume, $f_check, $($e,)* };
	};
}

#[macro_export]
macro_rules! TRACE
{
	{ $category:expr, $volume:expr, $( $e:expr ),*, } =>
	{
		$crate::TRACE_IF!{ $category, $volume, true, $($e,)* }
	};
	{ $category:expr, $volume:expr, $( $e:expr ),* } =>
	{
		TRACE!{ $category, $volume, $($e,)* };
	};
}



// Caller-opt-in propagation of a caught panic. Presents the failure once
//  per site; resume_unwind only happens if the presenter asks for it.
//
//  @usage
//  if let Err(payload) = std::panic::catch_unwind(|| work())
//  {
//      RETHROW!{ payload, "work() panicked" };
//  }

#[macro_export]
macro_rules! RETHROW
{
	{ $payload:expr, $( $e:expr ),*, } =>
	{
		{
			static CHECK_SITE : check_internal::CheckSite =
				check_internal::CheckSite::new(
												"unhandled panic",
												file!(),
												line!());

			let payload = $payload;

			if !CHECK_SITE.is_disabled()
				&& check_internal::alert_before_rethrow(
					&CHECK_SITE,
					$crate::function_path!(),
					&format!($($e),*))
			{
				std::panic::resume_unwind(payload);
			}
		}
	};
	{ $payload:expr, $( $e:expr ),* } =>
	{
		RETHROW!{ $payload, $($e,)* };
	};
	{ $payload:expr } =>
	{
		RETHROW!{ $payload, "unhandled panic" };
	};
}
