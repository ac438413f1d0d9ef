pub mod models {
    use core::sync::atomic::AtomicBool as StdAtomicBool;
    use core::sync::atomic::Ordering::SeqCst;
    use core::time::Duration;

    use loom::sync::Arc;
    use loom::{model, thread};

    use crate::config::Config;
    use crate::consumer::HeadDrainer;
    use crate::exclusion::Exclusion;
    use crate::lock::Mutex;
    use crate::producer::TailAdvancer;
    use crate::relax::Relax;
    use crate::state::Shared;

    /// The two orders in which one advance and one drain can run in sequence,
    /// starting from `[0, 0, 1]`.
    const SERIAL_OUTCOMES: [[u32; 3]; 2] = [[0, 2, 0], [0, 1, 1]];

    fn config() -> Config {
        Config::default().with_slots(3).with_delay(Duration::ZERO).with_idle(Duration::ZERO)
    }

    /// Runs one producer step against one consumer step over `[0, 0, 1]` and
    /// returns the final slots and whether the producer committed.
    fn step_pair<E>() -> (Vec<u32>, bool)
    where
        E: Exclusion + Send + Sync + 'static,
    {
        let config = config();
        let shared = Arc::new(Shared::<E>::new(config.slots));
        shared.slots().write_tail(1);

        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        let handle = thread::spawn(move || producer.step().is_ok());
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        consumer.step().unwrap();
        let committed = handle.join().unwrap();

        (shared.slots().snapshot(), committed && shared.producer_steps() == 1)
    }

    /// Evaluates that a guarded advance and a guarded drain always produce
    /// one of the serial outcomes: no interleaving loses the advance.
    pub fn guarded_step_pair<E>()
    where
        E: Exclusion + Send + Sync + 'static,
    {
        model(|| {
            let (slots, committed) = step_pair::<E>();
            assert!(committed);
            assert!(SERIAL_OUTCOMES.iter().any(|outcome| slots == outcome), "{slots:?}");
        });
    }

    /// Evaluates that without exclusion some interleaving of a committed
    /// advance and a drain ends in a non-serial state.
    pub fn unguarded_step_pair<E>()
    where
        E: Exclusion + Send + Sync + 'static,
    {
        static NON_SERIAL: StdAtomicBool = StdAtomicBool::new(false);
        NON_SERIAL.store(false, SeqCst);
        model(|| {
            let (slots, committed) = step_pair::<E>();
            if committed && !SERIAL_OUTCOMES.iter().any(|outcome| slots == outcome) {
                NON_SERIAL.store(true, SeqCst);
            }
        });
        assert!(NON_SERIAL.load(SeqCst));
    }

    /// Evaluates that concurrent `lock_then` calls serialize all mutations
    /// against the shared data.
    pub fn lock_join<R>()
    where
        R: Relax + 'static,
    {
        model(|| {
            const RUNS: u32 = 2;
            let lock = Arc::new(Mutex::<u32, R>::new(0));
            let handles: Vec<_> = (0..RUNS)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    thread::spawn(move || lock.lock_then(|data| *data += 1))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(lock.lock_then(|data| *data), RUNS);
        });
    }

    /// Evaluates that `try_lock_then` never hands out the data while it is
    /// held elsewhere.
    pub fn try_lock_join<R>()
    where
        R: Relax + 'static,
    {
        model(|| {
            let lock = Arc::new(Mutex::<u32, R>::new(0));
            let c_lock = Arc::clone(&lock);
            let handle = thread::spawn(move || c_lock.try_lock_then(|data| data.map(|data| *data += 1)));
            lock.lock_then(|data| *data += 1);
            let tried = handle.join().unwrap();
            let expected = if tried.is_some() { 2 } else { 1 };
            assert_eq!(lock.lock_then(|data| *data), expected);
        });
    }
}
