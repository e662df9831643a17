#![cfg(target_os = "linux")]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use hostloom::{
    DEFAULT_THREAD_PRIORITY, ErrorClass, HIGHEST_THREAD_PRIORITY, LOWEST_THREAD_PRIORITY,
    StackMemory, ThreadManager,
};

const TEST_STACK_SIZE: usize = 64 * 1024;

struct IdentityProbe {
    manager: Arc<ThreadManager>,
    expected: AtomicUsize,
    matched: AtomicBool,
}

fn check_identity(arg: usize) {
    // SAFETY: arg points to an IdentityProbe owned by the test, alive past join.
    let probe = unsafe { &*(arg as *const IdentityProbe) };
    if let Some(me) = probe.manager.get_current_thread() {
        let same = Arc::as_ptr(&me) as usize == probe.expected.load(Ordering::Acquire);
        probe.matched.store(same, Ordering::Release);
    }
}

struct CpuProbe {
    manager: Arc<ThreadManager>,
    cpu: AtomicI32,
}

fn record_processor(arg: usize) {
    // SAFETY: arg points to a CpuProbe owned by the test, alive past join.
    let probe = unsafe { &*(arg as *const CpuProbe) };
    let cpu = probe.manager.current_processor_number().unwrap_or(-1);
    probe.cpu.store(cpu, Ordering::Release);
}

fn park_until_released(arg: usize) {
    // SAFETY: arg points to an AtomicBool owned by the test, alive past join.
    let gate = unsafe { &*(arg as *const AtomicBool) };
    while !gate.load(Ordering::Acquire) {
        std::thread::yield_now();
    }
}

#[test]
fn current_thread_resolves_to_its_wrapper_inside_a_managed_thread() {
    let manager = ThreadManager::new();
    let probe = Box::new(IdentityProbe {
        manager: Arc::clone(&manager),
        expected: AtomicUsize::new(0),
        matched: AtomicBool::new(false),
    });
    let stack = StackMemory::allocate(TEST_STACK_SIZE).unwrap();

    let thread = manager
        .create_thread(
            check_identity,
            &*probe as *const IdentityProbe as usize,
            stack,
            DEFAULT_THREAD_PRIORITY,
        )
        .unwrap();
    probe
        .expected
        .store(Arc::as_ptr(&thread) as usize, Ordering::Release);

    thread.start().unwrap();
    thread.join().unwrap();
    assert!(probe.matched.load(Ordering::Acquire));

    manager.destroy_thread(thread).unwrap();
}

#[test]
fn foreign_threads_resolve_to_none() {
    let manager = ThreadManager::new();

    // The process's initial thread was not created through the manager.
    assert!(manager.get_current_thread().is_none());

    let manager_worker = Arc::clone(&manager);
    std::thread::spawn(move || {
        assert!(manager_worker.get_current_thread().is_none());
    })
    .join()
    .unwrap();
}

#[test]
fn destroying_a_running_thread_is_refused() {
    let manager = ThreadManager::new();
    let gate = Arc::new(AtomicBool::new(false));
    let stack = StackMemory::allocate(TEST_STACK_SIZE).unwrap();

    let thread = manager
        .create_thread(
            park_until_released,
            Arc::as_ptr(&gate) as usize,
            stack,
            DEFAULT_THREAD_PRIORITY,
        )
        .unwrap();
    thread.start().unwrap();

    let err = manager.destroy_thread(Arc::clone(&thread)).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Usage);

    gate.store(true, Ordering::Release);
    thread.join().unwrap();
    manager.destroy_thread(thread).unwrap();
}

#[test]
fn destroy_checks_manager_provenance() {
    let manager_a = ThreadManager::new();
    let manager_b = ThreadManager::new();
    let stack = StackMemory::allocate(TEST_STACK_SIZE).unwrap();

    let thread = manager_a
        .create_thread(record_processor, 0, stack, DEFAULT_THREAD_PRIORITY)
        .unwrap();
    let err = manager_b.destroy_thread(Arc::clone(&thread)).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Usage);

    manager_a.destroy_thread(thread).unwrap();
}

#[test]
fn extreme_priorities_report_originals_and_in_range_processors() {
    let manager = ThreadManager::new();
    let probe_hi = Box::new(CpuProbe {
        manager: Arc::clone(&manager),
        cpu: AtomicI32::new(-1),
    });
    let probe_lo = Box::new(CpuProbe {
        manager: Arc::clone(&manager),
        cpu: AtomicI32::new(-1),
    });

    let thread_hi = manager
        .create_thread(
            record_processor,
            &*probe_hi as *const CpuProbe as usize,
            StackMemory::allocate(TEST_STACK_SIZE).unwrap(),
            HIGHEST_THREAD_PRIORITY,
        )
        .unwrap();
    let thread_lo = manager
        .create_thread(
            record_processor,
            &*probe_lo as *const CpuProbe as usize,
            StackMemory::allocate(TEST_STACK_SIZE).unwrap(),
            LOWEST_THREAD_PRIORITY,
        )
        .unwrap();

    assert_eq!(thread_hi.original_priority(), HIGHEST_THREAD_PRIORITY);
    assert_eq!(thread_lo.original_priority(), LOWEST_THREAD_PRIORITY);

    thread_hi.start().unwrap();
    thread_lo.start().unwrap();
    thread_hi.join().unwrap();
    thread_lo.join().unwrap();

    // SAFETY: sysconf has no preconditions.
    let processors = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) } as i32;
    for probe in [&probe_hi, &probe_lo] {
        let cpu = probe.cpu.load(Ordering::Acquire);
        assert!(
            (0..processors).contains(&cpu),
            "processor {cpu} outside 0..{processors}"
        );
    }

    manager.destroy_thread(thread_hi).unwrap();
    manager.destroy_thread(thread_lo).unwrap();
}

#[test]
fn sleep_thread_elapses_at_least_the_requested_time() {
    let manager = ThreadManager::new();

    let started = Instant::now();
    manager.sleep_thread(50_000_000);
    assert!(started.elapsed() >= Duration::from_millis(50));

    // Non-positive durations return immediately.
    let started = Instant::now();
    manager.sleep_thread(0);
    manager.sleep_thread(-1);
    assert!(started.elapsed() < Duration::from_secs(1));

    manager.yield_thread();
}
