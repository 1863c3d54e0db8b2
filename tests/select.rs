use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_executor::block_on;
use parkline::select::Select;
use parkline::{channel, timer};

#[test]
fn exactly_one_case_runs() {
    let (s1, mut r1) = channel::<i32>(1).unwrap();
    let (s2, mut r2) = channel::<i32>(1).unwrap();
    s1.try_send(1).unwrap();
    s2.try_send(2).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let h1 = hits.clone();
    let h2 = hits.clone();

    block_on(async {
        let mut select = Select::new();
        select.case(&mut r1, move |res| async move {
            assert_eq!(res, Ok(1));
            h1.fetch_add(1, Ordering::SeqCst);
        });
        select.case(&mut r2, move |res| async move {
            assert_eq!(res, Ok(2));
            h2.fetch_add(1, Ordering::SeqCst);
        });
        select.end().await;
    });

    // Exactly one case ran, and the channel it didn't pick is untouched.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let leftover = r1.try_recv().is_ok() as usize + r2.try_recv().is_ok() as usize;
    assert_eq!(leftover, 1);
}

// Over many trials with two channels always ready, both cases eventually
// win: the tie-break is not fixed on one side.
#[test]
fn tie_break_is_not_fixed() {
    const TRIALS: usize = 200;
    let (s1, mut r1) = channel::<()>(1).unwrap();
    let (s2, mut r2) = channel::<()>(1).unwrap();

    let mut wins = [0usize; 2];
    for _ in 0..TRIALS {
        s1.try_send(()).unwrap();
        s2.try_send(()).unwrap();

        let winner = block_on(async {
            let picked = Arc::new(AtomicUsize::new(usize::MAX));
            let p1 = picked.clone();
            let p2 = picked.clone();

            let mut select = Select::new();
            select.case(&mut r1, move |_| async move {
                p1.store(0, Ordering::SeqCst);
            });
            select.case(&mut r2, move |_| async move {
                p2.store(1, Ordering::SeqCst);
            });
            select.end().await;
            picked.load(Ordering::SeqCst)
        });
        wins[winner] += 1;

        // Drain whichever channel lost this round so the next trial starts
        // from the same state.
        let _ = r1.try_recv();
        let _ = r2.try_recv();
    }

    assert!(wins[0] > 0, "case 0 never won across {TRIALS} trials");
    assert!(wins[1] > 0, "case 1 never won across {TRIALS} trials");
}

#[test]
fn timeout_wins_an_idle_channel() {
    let (_s, mut r) = channel::<i32>(1).unwrap();
    let mut timeout = timer::after(Duration::from_millis(10));

    let which = Arc::new(AtomicUsize::new(0));
    let w1 = which.clone();
    let w2 = which.clone();

    block_on(async {
        let mut select = Select::new();
        select.case(&mut r, move |_| async move {
            w1.store(1, Ordering::SeqCst);
        });
        select.case(&mut timeout, move |res| async move {
            assert!(res.is_ok());
            w2.store(2, Ordering::SeqCst);
        });
        select.end().await;
    });

    assert_eq!(which.load(Ordering::SeqCst), 2);
}

// The shorter of two racing timeouts always wins a select, across several
// trials with different duration pairs.
#[test]
fn shorter_timeout_always_wins() {
    let pairs = [(10, 150), (200, 20), (30, 260), (15, 400), (50, 180)];

    for (short_ms, long_ms) in pairs {
        let mut short = timer::after(Duration::from_millis(short_ms));
        let mut long = timer::after(Duration::from_millis(long_ms));

        let which = Arc::new(AtomicUsize::new(0));
        let w_short = which.clone();
        let w_long = which.clone();

        block_on(async {
            let mut select = Select::new();
            select.case(&mut short, move |res| async move {
                assert!(res.is_ok());
                w_short.store(1, Ordering::SeqCst);
            });
            select.case(&mut long, move |res| async move {
                assert!(res.is_ok());
                w_long.store(2, Ordering::SeqCst);
            });
            select.end().await;
        });

        assert_eq!(
            which.load(Ordering::SeqCst),
            1,
            "expected the {short_ms}ms timer to beat the {long_ms}ms one"
        );
    }
}

#[test]
fn close_while_selecting() {
    let (s1, mut r1) = channel::<i32>(1).unwrap();
    let (s2, mut r2) = channel::<i32>(1).unwrap();

    // r2's channel is already closed and drained; it should win immediately
    // with a `RecvError`.
    drop(s2);

    let saw_close = Arc::new(AtomicUsize::new(0));
    let s = saw_close.clone();

    block_on(async {
        let mut select = Select::new();
        select.case(&mut r1, |_| async move {
            panic!("r1 should not have been picked");
        });
        select.case(&mut r2, move |res| async move {
            s.store(res.is_err() as usize, Ordering::SeqCst);
        });
        select.end().await;
    });

    assert_eq!(saw_close.load(Ordering::SeqCst), 1);
    drop(s1);
}
