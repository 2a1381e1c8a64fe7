//! Account provisioning through arguments, `SFTP_USERS` and users.conf

use futures::future::BoxFuture;

use super::{start_and_wait, LEGACY_USERS_CONF, USERS_CONF};
use crate::container::Mount;
use crate::error::HarnessResult;
use crate::harness::{TestCase, TestContext};
use crate::users::{Identity, UserSpec};

pub(super) fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("smallest_user_config", smallest_user_config),
        TestCase::new("create_users_using_env", create_users_using_env),
        TestCase::new("create_users_using_combo", create_users_using_combo),
        TestCase::new("create_users_using_config_file", create_users_using_config_file),
        TestCase::new("legacy_config_path", legacy_config_path),
        TestCase::new("custom_uid_and_gid", custom_uid_and_gid),
        TestCase::new("user_with_dot", user_with_dot),
    ]
}

fn smallest_user_config(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let options = ctx
            .image()
            .entrypoint("/bin/sh")
            .args(["-c", "/entrypoint m: && id m"]);
        let code = ctx.run_once(options).await?;
        ctx.assert_equals(&0, &code, "user m was not created");
        Ok(())
    })
}

fn create_users_using_env(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let users = UserSpec::parse_list("user-from-env: user-from-env-2:")?;
        let options = ctx.image().env("SFTP_USERS", UserSpec::format_list(&users));
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }

        for user in &users {
            ctx.assert_user_exists(&user.name).await?;
        }
        Ok(())
    })
}

fn create_users_using_combo(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let conf = ctx.write_file(
            "users.conf",
            &UserSpec::format_config(&[UserSpec::new("user-from-conf")]),
        )?;
        let options = ctx
            .image()
            .mount(Mount::bind(conf, USERS_CONF).read_only())
            .env("SFTP_USERS", UserSpec::new("user-from-env").to_string())
            .arg(UserSpec::new("user-from-arg").to_string());
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }

        for user in ["user-from-conf", "user-from-env", "user-from-arg"] {
            ctx.assert_user_exists(user).await?;
        }
        Ok(())
    })
}

fn config_file_users() -> Vec<UserSpec> {
    vec![
        UserSpec::new("user-from-conf"),
        UserSpec::new("user-with-uid").uid(2001).gid(2001),
    ]
}

fn write_config(ctx: &TestContext, users: &[UserSpec]) -> HarnessResult<std::path::PathBuf> {
    ctx.write_file(
        "users.conf",
        &format!("# written by {}\n\n{}", ctx.case_name(), UserSpec::format_config(users)),
    )
}

/// `id` output for every user, or `None` if the container never came up.
async fn resolve_users(
    ctx: &mut TestContext,
    conf_path: &str,
    users: &[UserSpec],
) -> HarnessResult<Option<Vec<String>>> {
    let conf = write_config(ctx, users)?;
    let options = ctx.image().mount(Mount::bind(conf, conf_path).read_only());
    if !start_and_wait(ctx, options).await? {
        return Ok(None);
    }

    let mut resolved = Vec::with_capacity(users.len());
    for user in users {
        let out = ctx.exec_output(&["id", &user.name]).await?;
        ctx.assert_equals(&0, &out.exit_code, &format!("id {} via {}", user.name, conf_path));
        resolved.push(out.stdout.trim().to_string());
    }
    Ok(Some(resolved))
}

fn create_users_using_config_file(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let users = config_file_users();
        let Some(resolved) = resolve_users(ctx, USERS_CONF, &users).await? else {
            return Ok(());
        };

        match Identity::parse(&resolved[1]) {
            Ok(id) => {
                ctx.assert_equals(&2001, &id.uid, "uid of user-with-uid");
                ctx.assert_equals(&2001, &id.gid, "gid of user-with-uid");
            }
            Err(e) => {
                ctx.assert_true(false, &e.to_string());
            }
        }
        Ok(())
    })
}

fn legacy_config_path(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let users = config_file_users();
        let Some(documented) = resolve_users(ctx, USERS_CONF, &users).await? else {
            return Ok(());
        };

        ctx.container().retire(false).await?;

        let Some(legacy) = resolve_users(ctx, LEGACY_USERS_CONF, &users).await? else {
            return Ok(());
        };
        ctx.assert_equals(&documented, &legacy, "users from legacy config path differ");
        Ok(())
    })
}

fn custom_uid_and_gid(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let options = ctx.image().arg("u::1234:4321:");
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }

        let out = ctx.exec_output(&["id", "u"]).await?;
        let id = out.stdout.trim();
        ctx.assert_contains(id, "uid=1234(", "uid of u");
        ctx.assert_contains(id, "gid=4321(", "gid of u");
        ctx.assert_equals(
            "uid=1234(u) gid=4321(group_4321) groups=4321(group_4321)",
            id,
            "id u",
        );
        Ok(())
    })
}

fn user_with_dot(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let user = UserSpec::new("user.with.dot");
        let options = ctx.image().arg(user.to_string());
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }
        ctx.assert_user_exists(&user.name).await?;
        Ok(())
    })
}
