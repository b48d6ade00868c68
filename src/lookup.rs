//! Cache-then-fetch entity lookups.
//!
//! Each lookup tries the gateway cache first and falls back to a REST
//! fetch. Failures are reported and mapped to `None`; callers degrade the
//! affected feature instead of aborting their workflow.

use serenity::all::{ChannelId, GuildId, Member, Role, RoleId, User, UserId};
use serenity::model::channel::GuildChannel;
use serenity::prelude::Context;

use crate::report::Report;

pub async fn get_user(ctx: &Context, reporter: &dyn Report, id: UserId) -> Option<User> {
    if let Some(user) = ctx.cache.user(id).map(|u| u.clone()) {
        return Some(user);
    }
    match ctx.http.get_user(id).await {
        Ok(user) => Some(user),
        Err(err) => {
            reporter
                .report("ERROR", &format!("[getUser]: error fetching user with ID {id}: {err}"))
                .await;
            None
        }
    }
}

pub async fn get_member(
    ctx: &Context,
    reporter: &dyn Report,
    guild_id: GuildId,
    id: UserId,
) -> Option<Member> {
    if let Some(member) =
        ctx.cache.guild(guild_id).and_then(|guild| guild.members.get(&id).cloned())
    {
        return Some(member);
    }
    match ctx.http.get_member(guild_id, id).await {
        Ok(member) => Some(member),
        Err(err) => {
            reporter
                .report(
                    "ERROR",
                    &format!("[getMember]: error fetching member with ID {id}: {err}"),
                )
                .await;
            None
        }
    }
}

pub async fn get_channel(
    ctx: &Context,
    reporter: &dyn Report,
    id: ChannelId,
) -> Option<GuildChannel> {
    if let Some(channel) = ctx.cache.channel(id).map(|c| c.clone()) {
        return Some(channel);
    }
    match ctx.http.get_channel(id).await {
        Ok(channel) => channel.guild(),
        Err(err) => {
            reporter
                .report(
                    "ERROR",
                    &format!("[getChannel]: error fetching channel with ID {id}: {err}"),
                )
                .await;
            None
        }
    }
}

pub async fn get_role(
    ctx: &Context,
    reporter: &dyn Report,
    guild_id: GuildId,
    id: RoleId,
) -> Option<Role> {
    if let Some(role) =
        ctx.cache.guild(guild_id).and_then(|guild| guild.roles.get(&id).cloned())
    {
        return Some(role);
    }
    match ctx.http.get_guild_roles(guild_id).await {
        Ok(roles) => roles.into_iter().find(|role| role.id == id),
        Err(err) => {
            reporter
                .report("ERROR", &format!("[getRole]: error fetching role with ID {id}: {err}"))
                .await;
            None
        }
    }
}
