mod cancellation;
mod crash_recovery;
mod fix_loop;
mod happy_path;
mod tool_dispatch;
