//! Reassembles streamed deltas into text and complete tool calls.

use std::collections::BTreeMap;

use crate::api::{StreamEvent, ToolCallFragment};
use crate::models::ToolCall;

/// Why a model response stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    ToolCalls,
    Stop,
    Other(String),
    /// The stream ended without any terminal signal.
    Missing,
}

impl FinishReason {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("stop") => FinishReason::Stop,
            Some(other) => FinishReason::Other(other.to_string()),
            None => FinishReason::Missing,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Per-turn accumulator for one model response stream.
///
/// Text fragments are handed straight back to the caller for forwarding;
/// the caller owns the accumulated text. Tool-call fragments are grouped by their index:
/// name and arguments concatenate per index, a non-empty id overwrites.
/// Arguments stay raw text; nothing here parses them.
#[derive(Debug, Default)]
pub struct DeltaAggregator {
    tool_calls: BTreeMap<usize, PendingToolCall>,
    finish_reason: Option<String>,
}

/// Everything one stream produced once it has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTurn {
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl DeltaAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. Returns the text fragment to forward, if any.
    pub fn push(&mut self, event: StreamEvent) -> Option<String> {
        for fragment in event.tool_calls {
            self.push_fragment(fragment);
        }

        if let Some(reason) = event.finish_reason {
            self.finish_reason = Some(reason);
        }

        event.content.filter(|c| !c.is_empty())
    }

    fn push_fragment(&mut self, fragment: ToolCallFragment) {
        let pending = self.tool_calls.entry(fragment.index).or_default();

        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            pending.id = id;
        }
        if let Some(name) = fragment.name {
            pending.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            pending.arguments.push_str(&arguments);
        }
    }

    /// Tool calls reconstructed so far, ordered by index.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .map(|p| ToolCall::function(p.id.clone(), p.name.clone(), p.arguments.clone()))
            .collect()
    }

    pub fn finish(self) -> AggregatedTurn {
        let tool_calls = self.tool_calls();
        AggregatedTurn {
            tool_calls,
            finish_reason: FinishReason::parse(self.finish_reason.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frag(index: usize) -> ToolCallFragment {
        ToolCallFragment::new(index)
    }

    #[test]
    fn forwards_non_empty_text() {
        let mut agg = DeltaAggregator::new();
        assert_eq!(agg.push(StreamEvent::text("Hel")), Some("Hel".to_string()));
        assert_eq!(agg.push(StreamEvent::text("")), None);
        assert_eq!(agg.push(StreamEvent::text("lo")), Some("lo".to_string()));
        assert_eq!(agg.push(StreamEvent::finish("stop")), None);

        let turn = agg.finish();
        assert!(turn.tool_calls.is_empty());
        assert_eq!(turn.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn rebuilds_a_single_call_from_fragments() {
        let mut agg = DeltaAggregator::new();
        agg.push(StreamEvent::tool_fragment(frag(0).id("call_1").name("web_")));
        agg.push(StreamEvent::tool_fragment(frag(0).name("search").arguments("{\"query\":")));
        agg.push(StreamEvent::tool_fragment(frag(0).arguments("\"weather in Paris\"}")));
        agg.push(StreamEvent::finish("tool_calls"));

        let turn = agg.finish();
        assert_eq!(turn.finish_reason, FinishReason::ToolCalls);
        assert_eq!(
            turn.tool_calls,
            vec![ToolCall::function(
                "call_1",
                "web_search",
                "{\"query\":\"weather in Paris\"}"
            )]
        );
    }

    #[test]
    fn empty_id_fragment_does_not_clear_id() {
        let mut agg = DeltaAggregator::new();
        agg.push(StreamEvent::tool_fragment(frag(0).id("call_1")));
        agg.push(StreamEvent::tool_fragment(frag(0).id("").arguments("{}")));
        assert_eq!(agg.tool_calls()[0].id, "call_1");
    }

    #[test]
    fn partial_json_is_never_an_error() {
        let mut agg = DeltaAggregator::new();
        agg.push(StreamEvent::tool_fragment(frag(0).id("c").name("add_transaction").arguments("{\"amo")));
        let calls = agg.tool_calls();
        assert_eq!(calls[0].function.arguments, "{\"amo");
    }

    #[test]
    fn orders_calls_by_index_not_arrival() {
        let mut agg = DeltaAggregator::new();
        agg.push(StreamEvent::tool_fragment(frag(2).id("c").name("third")));
        agg.push(StreamEvent::tool_fragment(frag(0).id("a").name("first")));
        agg.push(StreamEvent::tool_fragment(frag(1).id("b").name("second")));

        let names: Vec<_> = agg.tool_calls().into_iter().map(|c| c.function.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn unknown_and_missing_finish_reasons() {
        let mut agg = DeltaAggregator::new();
        agg.push(StreamEvent::finish("length"));
        assert_eq!(agg.finish().finish_reason, FinishReason::Other("length".to_string()));

        let agg = DeltaAggregator::new();
        assert_eq!(agg.finish().finish_reason, FinishReason::Missing);
    }

    /// Split `text` at the given (sorted, deduplicated) byte offsets that
    /// fall on char boundaries, yielding only non-empty pieces.
    fn split_at_points(text: &str, mut points: Vec<usize>) -> Vec<String> {
        points.retain(|&p| p > 0 && p < text.len() && text.is_char_boundary(p));
        points.sort_unstable();
        points.dedup();

        let mut pieces = Vec::new();
        let mut start = 0;
        for p in points {
            pieces.push(text[start..p].to_string());
            start = p;
        }
        if start < text.len() {
            pieces.push(text[start..].to_string());
        }
        pieces
    }

    fn call_fragments(index: usize, id: &str, name: &str, args: &str, cuts: Vec<usize>) -> Vec<ToolCallFragment> {
        let mut fragments = vec![frag(index).id(id)];
        fragments.extend(split_at_points(name, cuts.clone()).into_iter().map(|n| frag(index).name(n)));
        fragments.extend(split_at_points(args, cuts).into_iter().map(|a| frag(index).arguments(a)));
        fragments
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_change_result(
            name in "[a-z_]{1,20}",
            args in "\\PC{0,60}",
            cuts in prop::collection::vec(0usize..80, 0..12)
        ) {
            let mut agg = DeltaAggregator::new();
            for fragment in call_fragments(0, "call_x", &name, &args, cuts) {
                agg.push(StreamEvent::tool_fragment(fragment));
            }

            let calls = agg.tool_calls();
            prop_assert_eq!(calls.len(), 1);
            prop_assert_eq!(&calls[0].id, "call_x");
            prop_assert_eq!(&calls[0].function.name, &name);
            prop_assert_eq!(&calls[0].function.arguments, &args);
        }

        #[test]
        fn prop_interleaving_matches_contiguous_delivery(
            calls in prop::collection::vec(("[a-z]{1,10}", "\\PC{0,30}", prop::collection::vec(0usize..40, 0..6)), 1..4),
            picks in prop::collection::vec(0usize..4, 0..200)
        ) {
            let per_call: Vec<Vec<ToolCallFragment>> = calls
                .iter()
                .enumerate()
                .map(|(i, (name, args, cuts))| call_fragments(i, &format!("call_{}", i), name, args, cuts.clone()))
                .collect();

            let mut contiguous = DeltaAggregator::new();
            for fragment in per_call.iter().flatten() {
                contiguous.push(StreamEvent::tool_fragment(fragment.clone()));
            }

            // Round-robin driven by `picks`, preserving order within each index.
            let mut queues: Vec<std::collections::VecDeque<ToolCallFragment>> =
                per_call.into_iter().map(Into::into).collect();
            let mut interleaved = DeltaAggregator::new();
            let mut picks = picks.into_iter();
            while queues.iter().any(|q| !q.is_empty()) {
                let start = picks.next().unwrap_or(0) % queues.len();
                let slot = (0..queues.len())
                    .map(|offset| (start + offset) % queues.len())
                    .find(|&i| !queues[i].is_empty())
                    .unwrap();
                let fragment = queues[slot].pop_front().unwrap();
                interleaved.push(StreamEvent::tool_fragment(fragment));
            }

            prop_assert_eq!(interleaved.tool_calls(), contiguous.tool_calls());
        }
    }
}
