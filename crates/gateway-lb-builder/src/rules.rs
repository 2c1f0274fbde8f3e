//! Listener rules of application load balancers.
//!
//! Each ranked route rule becomes one listener rule. Actions are, in order:
//! pre-routing authentication (secure listeners only), then exactly one
//! routing action chosen from an explicit fixed response or redirect, the
//! route's redirect filter, a forward to the rule's backends, or a 503 when
//! there is nothing to forward to.

use std::collections::BTreeSet;
use std::sync::Arc;

use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::crd::{
    AuthenticateCognitoConfig, AuthenticateOidcConfig, FixedResponseConfig, RedirectConfig,
    RuleActionConfig,
};
use gateway_lb_model::elbv2::{
    AuthenticateCognitoActionConfig, AuthenticateOidcActionConfig, FixedResponseActionConfig,
    ForwardActionConfig, RedirectActionConfig, TargetGroupStickinessConfig, TargetGroupTuple,
};
use gateway_lb_model::{Action, ListenerRule, ListenerRuleSpec, Protocol, Stack};
use tracing::{debug, warn};

use crate::config::BuilderConfig;
use crate::error::{BuildError, ProviderContext, Result};
use crate::providers::SecretReader;
use crate::routes::{RankedRule, RouteDescriptor, RulePrecedenceSorter};
use crate::tags::TagHelper;
use crate::target_group::TargetGroupBuilder;

/// Secret key holding the OIDC client ID.
pub const OIDC_CLIENT_ID_KEY: &str = "clientID";
/// Secret key holding the OIDC client secret.
pub const OIDC_CLIENT_SECRET_KEY: &str = "clientSecret";

/// The listener rules hang off.
#[derive(Debug, Clone, Copy)]
pub struct RuleListener<'a> {
    /// Listener port.
    pub port: i32,
    /// Listener protocol.
    pub protocol: Protocol,
    /// Deferred listener ARN.
    pub arn: &'a StringToken,
}

/// Builds the listener rules of one port.
pub struct RuleBuilder<'a> {
    config: &'a BuilderConfig,
    sorter: &'a dyn RulePrecedenceSorter,
    secrets: &'a dyn SecretReader,
    targets: &'a dyn TargetGroupBuilder,
}

impl<'a> RuleBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(
        config: &'a BuilderConfig,
        sorter: &'a dyn RulePrecedenceSorter,
        secrets: &'a dyn SecretReader,
        targets: &'a dyn TargetGroupBuilder,
    ) -> Self {
        Self {
            config,
            sorter,
            secrets,
            targets,
        }
    }

    /// Add one rule per ranked route rule, with priorities 1, 2, 3...
    ///
    /// Secrets read for authentication actions are added to `secrets_touched`.
    /// Returns the number of rules added.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid rule settings, and
    /// propagates target group and secret lookup errors.
    pub async fn build(
        &self,
        stack: &mut Stack,
        listener: RuleListener<'_>,
        routes: &[Arc<dyn RouteDescriptor>],
        secrets_touched: &mut BTreeSet<NamespacedName>,
    ) -> Result<usize> {
        let ranked = self.sorter.sort(listener.port, routes);
        let tags = TagHelper::new(self.config);

        for (index, ranked_rule) in ranked.iter().enumerate() {
            let priority = i32::try_from(index + 1)
                .map_err(|_| BuildError::config(format!("too many rules on port {}", listener.port)))?;
            let actions = self
                .actions(stack, listener, ranked_rule, secrets_touched)
                .await?;

            let rule_config = ranked_rule.rule.listener_rule_config.as_ref();
            let mut conditions = ranked_rule.rule.conditions.clone();
            if let Some(cfg) = rule_config {
                conditions.extend(cfg.conditions.iter().cloned());
            }

            stack.add(ListenerRule::new(
                format!("{}:{priority}", listener.port),
                ListenerRuleSpec {
                    listener_arn: listener.arn.clone(),
                    priority,
                    conditions,
                    actions,
                    tags: tags.resolve(rule_config.and_then(|cfg| cfg.tags.as_ref()))?,
                },
            ))?;
        }
        debug!(port = listener.port, rules = ranked.len(), "built listener rules");
        Ok(ranked.len())
    }

    async fn actions(
        &self,
        stack: &mut Stack,
        listener: RuleListener<'_>,
        ranked: &RankedRule,
        secrets_touched: &mut BTreeSet<NamespacedName>,
    ) -> Result<Vec<Action>> {
        let route = &ranked.route;
        let route_nn = route.route_namespaced_name();
        let configured: &[RuleActionConfig] = ranked
            .rule
            .listener_rule_config
            .as_ref()
            .map(|cfg| cfg.actions.as_slice())
            .unwrap_or_default();

        let mut actions = Vec::new();
        for pre in configured.iter().filter(|a| a.is_pre_routing()) {
            if !listener.protocol.is_secure() {
                warn!(
                    route = %route_nn,
                    port = listener.port,
                    "authentication actions need a secure listener; skipped"
                );
                continue;
            }
            actions.push(match pre {
                RuleActionConfig::AuthenticateOidc(oidc) => {
                    self.oidc_action(oidc, &route_nn.namespace, secrets_touched).await?
                }
                RuleActionConfig::AuthenticateCognito(cognito) => cognito_action(cognito),
                _ => continue,
            });
        }

        let explicit = configured.iter().find_map(|a| match a {
            RuleActionConfig::FixedResponse(fixed) => Some(fixed_response_action(fixed)),
            RuleActionConfig::Redirect(redirect) => Some(redirect_action(redirect)),
            _ => None,
        });
        let routing = match (explicit, ranked.rule.redirect.as_ref()) {
            (Some(action), _) => action?,
            (None, Some(redirect)) => redirect_action(redirect)?,
            (None, None) => {
                let stickiness = configured.iter().find_map(|a| match a {
                    RuleActionConfig::Forward(forward) => forward.target_group_stickiness_config,
                    _ => None,
                });
                self.forward_action(stack, &**route, ranked, stickiness)
                    .await?
            }
        };
        actions.push(routing);
        Ok(actions)
    }

    async fn forward_action(
        &self,
        stack: &mut Stack,
        route: &dyn RouteDescriptor,
        ranked: &RankedRule,
        stickiness: Option<TargetGroupStickinessConfig>,
    ) -> Result<Action> {
        if ranked.rule.backends.is_empty() {
            return Ok(Action::fixed_response(503));
        }
        let mut target_groups = Vec::with_capacity(ranked.rule.backends.len());
        for backend in &ranked.rule.backends {
            let arn = self.targets.build_target_group(stack, route, backend).await?;
            target_groups.push(TargetGroupTuple {
                target_group_arn: arn,
                weight: Some(backend.weight()),
            });
        }
        Ok(Action::Forward(ForwardActionConfig {
            target_groups,
            target_group_stickiness_config: stickiness,
        }))
    }

    async fn oidc_action(
        &self,
        oidc: &AuthenticateOidcConfig,
        route_namespace: &str,
        secrets_touched: &mut BTreeSet<NamespacedName>,
    ) -> Result<Action> {
        let secret = NamespacedName::new(
            oidc.secret.namespace.as_deref().unwrap_or(route_namespace),
            &oidc.secret.name,
        );
        secrets_touched.insert(secret.clone());
        let data = self
            .secrets
            .read_secret(&secret)
            .await
            .context(|| format!("reading OIDC secret {secret}"))?;
        let field = |key: &str| {
            data.get(key)
                .map(|value| value.trim().to_string())
                .ok_or_else(|| BuildError::config(format!("secret {secret} has no {key:?} key")))
        };
        Ok(Action::AuthenticateOidc(AuthenticateOidcActionConfig {
            issuer: oidc.issuer.clone(),
            authorization_endpoint: oidc.authorization_endpoint.clone(),
            token_endpoint: oidc.token_endpoint.clone(),
            user_info_endpoint: oidc.user_info_endpoint.clone(),
            client_id: field(OIDC_CLIENT_ID_KEY)?,
            client_secret: field(OIDC_CLIENT_SECRET_KEY)?,
            authentication_request_extra_params: oidc.authentication_request_extra_params.clone(),
            on_unauthenticated_request: oidc.on_unauthenticated_request.clone(),
            scope: oidc.scope.clone(),
            session_cookie_name: oidc.session_cookie_name.clone(),
            session_timeout: oidc.session_timeout,
        }))
    }
}

fn cognito_action(cognito: &AuthenticateCognitoConfig) -> Action {
    Action::AuthenticateCognito(AuthenticateCognitoActionConfig {
        user_pool_arn: cognito.user_pool_arn.clone(),
        user_pool_client_id: cognito.user_pool_client_id.clone(),
        user_pool_domain: cognito.user_pool_domain.clone(),
        authentication_request_extra_params: cognito.authentication_request_extra_params.clone(),
        on_unauthenticated_request: cognito.on_unauthenticated_request.clone(),
        scope: cognito.scope.clone(),
        session_cookie_name: cognito.session_cookie_name.clone(),
        session_timeout: cognito.session_timeout,
    })
}

fn fixed_response_action(fixed: &FixedResponseConfig) -> Result<Action> {
    if !(200..=599).contains(&fixed.status_code) {
        return Err(BuildError::config(format!(
            "invalid fixed response status code {}",
            fixed.status_code
        )));
    }
    Ok(Action::FixedResponse(FixedResponseActionConfig {
        content_type: fixed.content_type.clone(),
        message_body: fixed.message_body.clone(),
        status_code: fixed.status_code.to_string(),
    }))
}

/// Translate a redirect into an ELB redirect, keeping `#{...}` placeholders for
/// unset components.
///
/// # Errors
///
/// Returns a configuration error for status codes other than 301 and 302.
pub fn redirect_action(redirect: &RedirectConfig) -> Result<Action> {
    let status_code = match redirect.status_code {
        Some(301) => "HTTP_301",
        Some(302) | None => "HTTP_302",
        Some(other) => {
            return Err(BuildError::config(format!("unsupported redirect status code {other}")))
        }
    };
    let protocol = redirect.scheme.as_ref().map(|s| s.to_ascii_uppercase());
    // a scheme change without a port moves to the scheme's well-known port
    let port = match (redirect.port, protocol.as_deref()) {
        (Some(port), _) => port.to_string(),
        (None, Some("HTTPS")) => "443".to_string(),
        (None, Some("HTTP")) => "80".to_string(),
        (None, _) => "#{port}".to_string(),
    };
    Ok(Action::Redirect(RedirectActionConfig {
        host: redirect.hostname.clone().unwrap_or_else(|| "#{host}".to_string()),
        path: redirect.path.clone().unwrap_or_else(|| "/#{path}".to_string()),
        port,
        protocol: protocol.unwrap_or_else(|| "#{protocol}".to_string()),
        query: redirect.query.clone().unwrap_or_else(|| "#{query}".to_string()),
        status_code: status_code.to_string(),
    }))
}
