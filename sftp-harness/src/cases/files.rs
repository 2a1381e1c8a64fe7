//! Home directory layout and sftp writes

use futures::future::BoxFuture;

use super::start_and_wait;
use crate::container::Mount;
use crate::error::HarnessResult;
use crate::harness::{TestCase, TestContext};
use crate::users::UserSpec;

pub(super) fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("create_dirs_in_home", create_dirs_in_home),
        TestCase::new("write_to_mounted_directory", write_to_mounted_directory),
    ]
}

fn create_dirs_in_home(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let user = UserSpec::new("user").dir("dir1").dir("dir2");
        let options = ctx.image().arg(user.to_string());
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }

        for dir in &user.dirs {
            ctx.assert_dir_exists(&format!("/home/{}/{}", user.name, dir)).await?;
        }
        Ok(())
    })
}

fn write_to_mounted_directory(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let keys = ctx.key_pair().await?;
        let share = ctx.create_dir("share")?;
        // Container user ids differ from ours
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&share, std::fs::Permissions::from_mode(0o777))?;
        }

        let user = UserSpec::new("test");
        let options = ctx
            .image()
            .mount(Mount::bind(&keys.public_key, "/home/test/.ssh/keys/id_rsa.pub").read_only())
            .mount(Mount::bind(&share, "/home/test/share"))
            .arg(user.to_string());
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }

        let code = ctx.sftp(&user.name, &["cd share", "mkdir mkdir-test"]).await?;
        if !ctx.assert_equals(&0, &code, "sftp batch failed") {
            return Ok(());
        }
        ctx.assert_dir_exists("/home/test/share/mkdir-test").await?;
        ctx.assert_true(
            share.join("mkdir-test").is_dir(),
            "directory created over sftp is missing on the host",
        );
        Ok(())
    })
}
