use crate::study::scheduler::Scheduler;

pub async fn run(scheduler: &Scheduler) {
    tracing::debug!("schedule_rollover: start");
    match scheduler.rollover() {
        Ok(true) => tracing::info!("schedule_rollover: stale overrides dropped"),
        Ok(false) => tracing::debug!("schedule_rollover: nothing to clear"),
        Err(e) => tracing::error!(error = %e, "schedule_rollover failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::store::operations::schedule::ScheduleState;
    use crate::store::Store;
    use crate::study::clock::FixedClock;

    use super::*;

    #[tokio::test]
    async fn drops_stale_selections_and_marks_of_missing_sets() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(tmp.path().join("rollover.sled").to_str().unwrap()).unwrap());

        let yesterday = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let mut state = ScheduleState::empty(yesterday);
        state.study_ids.push("set-2".to_string());
        state.reviewed_ids.push("set-1".to_string());
        store.set_schedule_state(&state).unwrap();

        let today = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 5).unwrap();
        let scheduler = Scheduler::new(store.clone(), Arc::new(FixedClock(today)));
        run(&scheduler).await;

        let stored = store.get_schedule_state().unwrap().unwrap();
        assert!(stored.study_ids.is_empty());
        assert!(stored.reviewed_ids.is_empty());
        assert_eq!(stored.last_updated, today);
    }
}
