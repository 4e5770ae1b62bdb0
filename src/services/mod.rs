pub(crate) mod ai_grading;
pub(crate) mod answer_key;
pub(crate) mod answer_key_merge;
pub(crate) mod detail_merge;
pub(crate) mod image_cache;
pub(crate) mod image_ref;
pub(crate) mod review_autoclear;
pub(crate) mod review_ledger;
pub(crate) mod review_triage;
pub(crate) mod storage;
