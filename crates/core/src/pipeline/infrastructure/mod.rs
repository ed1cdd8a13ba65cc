pub mod threaded_clip_executor;
