//! Chat session orchestration: the UI-facing model manager and the
//! background worker it feeds.

pub mod manager;
pub mod worker;

pub use manager::{ModelManager, Notice, NoticeLevel, SettingsPatch, TurnStream};
pub use worker::{ChatWorker, EngineSlot, TIMEOUT_REPLY, WorkerHandle};
