use crate::protocol::{ControlEvent, RemoteFile};

/// Collection state of one listing.
///
/// The response shape is decided by the first listing event: a
/// `FILES=` event completes the listing on its own, an `ITEM` opens a
/// stream that only completes on `END=1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingState {
    AwaitingFirstEvent,
    Streaming(Vec<RemoteFile>),
    Finalized(Vec<RemoteFile>),
}

#[derive(Debug)]
pub struct ListingCollector {
    state: ListingState,
}

impl Default for ListingCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingCollector {
    pub fn new() -> Self {
        Self {
            state: ListingState::AwaitingFirstEvent,
        }
    }

    pub fn state(&self) -> &ListingState {
        &self.state
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, ListingState::Finalized(_))
    }

    /// Feed one control event. Returns true once the listing is final.
    pub fn observe(&mut self, event: &ControlEvent) -> bool {
        let state = std::mem::replace(&mut self.state, ListingState::AwaitingFirstEvent);
        self.state = match (state, event) {
            (ListingState::Finalized(files), _) => ListingState::Finalized(files),

            (ListingState::AwaitingFirstEvent, ControlEvent::ListSingleShot { files }) => {
                tracing::debug!("Listing: single-shot response with {} files", files.len());
                finalize(files.clone())
            }
            (ListingState::Streaming(collected), ControlEvent::ListSingleShot { files }) => {
                tracing::debug!(
                    "Listing: single-shot response replaces {} streamed items",
                    collected.len()
                );
                finalize(files.clone())
            }

            (ListingState::AwaitingFirstEvent, ControlEvent::ListItem(file)) => {
                tracing::debug!("Listing: streamed response");
                ListingState::Streaming(vec![file.clone()])
            }
            (ListingState::Streaming(mut files), ControlEvent::ListItem(file)) => {
                files.push(file.clone());
                ListingState::Streaming(files)
            }

            (ListingState::AwaitingFirstEvent, ControlEvent::ListEnd) => finalize(Vec::new()),
            (ListingState::Streaming(files), ControlEvent::ListEnd) => finalize(files),

            (state, _) => state,
        };
        self.is_finalized()
    }

    /// Files of a finalized listing, newest first.
    pub fn into_files(self) -> Option<Vec<RemoteFile>> {
        match self.state {
            ListingState::Finalized(files) => Some(files),
            _ => None,
        }
    }
}

fn finalize(mut files: Vec<RemoteFile>) -> ListingState {
    sort_newest_first(&mut files);
    ListingState::Finalized(files)
}

/// Names embed a sortable timestamp, so descending name order is newest first.
pub fn sort_newest_first(files: &mut [RemoteFile]) {
    files.sort_by(|a, b| b.name.cmp(&a.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ControlEvent;

    fn feed(lines: &[&str]) -> ListingCollector {
        let mut collector = ListingCollector::new();
        for line in lines {
            let event = ControlEvent::parse_line(line).unwrap();
            collector.observe(&event);
        }
        collector
    }

    #[test]
    fn test_streamed_items_sorted_on_end() {
        let collector = feed(&[
            "ITEM;NAME=b.csv;SIZE=10;",
            "ITEM;NAME=a.csv;SIZE=20;",
            "ITEM;NAME=c.csv;SIZE=30;",
            "CMD=LIST;END=1;",
        ]);
        let files = collector.into_files().unwrap();
        assert_eq!(
            files,
            vec![
                RemoteFile::new("c.csv", 30),
                RemoteFile::new("b.csv", 10),
                RemoteFile::new("a.csv", 20),
            ]
        );
    }

    #[test]
    fn test_stream_not_final_before_end() {
        let collector = feed(&["ITEM;NAME=b.csv;SIZE=10;", "ITEM;NAME=a.csv;SIZE=20;"]);
        assert!(!collector.is_finalized());
        assert!(matches!(collector.state(), ListingState::Streaming(files) if files.len() == 2));
        assert!(collector.into_files().is_none());
    }

    #[test]
    fn test_single_shot_is_final_immediately() {
        let mut collector = ListingCollector::new();
        let event = ControlEvent::parse_line(
            "CMD=LIST;DIR=SESSIONS;FILES=20250101_0900.csv:120,20250102_1000.csv:340",
        )
        .unwrap();
        assert!(collector.observe(&event));
        let files = collector.into_files().unwrap();
        assert_eq!(files[0], RemoteFile::new("20250102_1000.csv", 340));
        assert_eq!(files[1], RemoteFile::new("20250101_0900.csv", 120));
    }

    #[test]
    fn test_end_without_items_is_empty_listing() {
        let collector = feed(&["CMD=LIST;END=1;"]);
        assert_eq!(collector.into_files(), Some(vec![]));
    }

    #[test]
    fn test_events_after_final_are_ignored() {
        let collector = feed(&[
            "CMD=LIST;DIR=SESSIONS;FILES=a.csv:1",
            "ITEM;NAME=z.csv;SIZE=9;",
            "CMD=LIST;END=1;",
        ]);
        assert_eq!(collector.into_files(), Some(vec![RemoteFile::new("a.csv", 1)]));
    }

    #[test]
    fn test_unrelated_events_do_not_decide_shape() {
        let collector = feed(&["CMD=DONE;DIR=TX;", "CMD=GET;SIZE=3;"]);
        assert_eq!(collector.state(), &ListingState::AwaitingFirstEvent);
    }
}
