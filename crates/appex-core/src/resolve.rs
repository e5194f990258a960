//! First-match property resolution across the configuration layers.

use std::iter;

use crate::prop::{Layer, PropName, PropValue};

/// Which layer supplied a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    CallSite,
    Instance,
    /// Index into the ancestor layers, nearest ancestor first.
    Ancestor(usize),
    Builtin,
}

/// The candidate layers, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub struct Sources<'a> {
    pub call_site: &'a Layer,
    pub instance: Option<&'a Layer>,
    /// Nearest ancestor first.
    pub ancestors: &'a [Layer],
    pub builtin: &'a Layer,
}

impl<'a> Sources<'a> {
    /// Every layer in precedence order, tagged with its source.
    pub fn layers(self) -> impl Iterator<Item = (Source, &'a Layer)> {
        let Sources {
            call_site,
            instance,
            ancestors,
            builtin,
        } = self;
        iter::once((Source::CallSite, call_site))
            .chain(instance.map(|layer| (Source::Instance, layer)))
            .chain(
                ancestors
                    .iter()
                    .enumerate()
                    .map(|(i, layer)| (Source::Ancestor(i), layer)),
            )
            .chain(iter::once((Source::Builtin, builtin)))
    }

    /// The same sources with the ancestor layers removed.
    pub fn without_ancestors(&self) -> Self {
        Sources { ancestors: &[], ..*self }
    }
}

/// Return the first value for `name` that passes `is_valid`.
///
/// Present but invalid values are skipped as if absent.
pub fn resolve<'a, F>(name: PropName, is_valid: F, sources: &Sources<'a>) -> Option<(&'a PropValue, Source)>
where
    F: Fn(&PropValue) -> bool,
{
    let hit = sources.layers().find_map(|(source, layer)| {
        let value = layer.get(name)?;
        if is_valid(value) {
            Some((value, source))
        } else {
            tracing::trace!(prop = %name, ?source, found = value.type_name(), "skipping invalid value");
            None
        }
    });
    match &hit {
        Some((_, source)) => tracing::trace!(prop = %name, ?source, "resolved"),
        None => tracing::trace!(prop = %name, "unresolved"),
    }
    hit
}

/// [`resolve`] with the property's own validity predicate.
pub fn resolve_prop<'a>(name: PropName, sources: &Sources<'a>) -> Option<(&'a PropValue, Source)> {
    resolve(name, |v| name.is_valid(v), sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(value: Option<PropValue>) -> Layer {
        let mut layer = Layer::new();
        if let Some(v) = value {
            layer.set(PropName::Code, v);
        }
        layer
    }

    fn code(sources: &Sources<'_>) -> Option<(String, Source)> {
        resolve_prop(PropName::Code, sources).map(|(v, s)| (v.as_str().unwrap_or_default().to_string(), s))
    }

    #[test]
    fn precedence_is_call_site_instance_ancestors_builtin() {
        let call = layer(Some("v1".into()));
        let inst = layer(Some("v2".into()));
        let ancestors = vec![layer(Some("v3".into()))];
        let builtin = layer(Some("v4".into()));
        let empty = layer(None);

        let mut sources = Sources {
            call_site: &call,
            instance: Some(&inst),
            ancestors: &ancestors,
            builtin: &builtin,
        };
        assert_eq!(code(&sources), Some(("v1".into(), Source::CallSite)));

        sources.call_site = &empty;
        assert_eq!(code(&sources), Some(("v2".into(), Source::Instance)));

        sources.instance = None;
        assert_eq!(code(&sources), Some(("v3".into(), Source::Ancestor(0))));

        sources.ancestors = &[];
        assert_eq!(code(&sources), Some(("v4".into(), Source::Builtin)));

        sources.builtin = &empty;
        assert_eq!(code(&sources), None);
    }

    #[test]
    fn nearest_ancestor_wins() {
        let empty = layer(None);
        let ancestors = vec![layer(None), layer(Some("mid".into())), layer(Some("root".into()))];
        let sources = Sources {
            call_site: &empty,
            instance: None,
            ancestors: &ancestors,
            builtin: &empty,
        };
        assert_eq!(code(&sources), Some(("mid".into(), Source::Ancestor(1))));
    }

    #[test]
    fn invalid_values_fall_through() {
        let call = layer(Some(PropValue::Int(7)));
        let inst = layer(Some(PropValue::Bool(true)));
        let builtin = layer(Some("fallback".into()));
        let sources = Sources {
            call_site: &call,
            instance: Some(&inst),
            ancestors: &[],
            builtin: &builtin,
        };
        assert_eq!(code(&sources), Some(("fallback".into(), Source::Builtin)));
    }

    #[test]
    fn custom_predicate_is_honoured() {
        let call = layer(Some("short".into()));
        let builtin = layer(Some("much longer".into()));
        let sources = Sources {
            call_site: &call,
            instance: None,
            ancestors: &[],
            builtin: &builtin,
        };
        let long_only = |v: &PropValue| v.as_str().is_some_and(|s| s.len() > 5);
        let (value, source) = resolve(PropName::Code, long_only, &sources).unwrap();
        assert_eq!(value.as_str(), Some("much longer"));
        assert_eq!(source, Source::Builtin);
    }

    #[test]
    fn without_ancestors_skips_ancestor_layers() {
        let empty = layer(None);
        let ancestors = vec![layer(Some("anc".into()))];
        let sources = Sources {
            call_site: &empty,
            instance: None,
            ancestors: &ancestors,
            builtin: &empty,
        };
        assert_eq!(code(&sources.without_ancestors()), None);
    }
}
