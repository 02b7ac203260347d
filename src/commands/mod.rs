pub type CmdResult<T> = portal_deploy::Result<(T, i32)>;

pub mod deploy;
