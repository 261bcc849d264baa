use esg_common::error::StoreError;
use esg_common::record::Record;
use esg_common::store::RecordStore;
use tracing::debug;

/// One page of unindexed records, as fetched at `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub offset: usize,
    pub records: Vec<Record>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// An empty page is the only end-of-work signal.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids in page order, for log context.
    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().filter_map(Record::id).collect()
    }
}

/// Offset-paginated reader over records whose index is still null.
pub struct PageReader<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    page_size: usize,
}

impl<'s, S: RecordStore + ?Sized> PageReader<'s, S> {
    pub fn new(store: &'s S, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn next_page(&self, offset: usize) -> Result<Page, StoreError> {
        let records = self.store.select_unindexed(self.page_size, offset).await?;
        debug!(
            "Fetched page at offset {}: {} record(s)",
            offset,
            records.len()
        );
        Ok(Page { offset, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_common::datum::Datum;
    use esg_common::schema::Field;
    use esg_common::store::MemoryStore;

    fn rec(id: i64) -> Record {
        Record::empty().with(Field::Id, Datum::Int64(id))
    }

    #[tokio::test]
    async fn test_pages_cover_every_row_once() {
        let store = MemoryStore::with_records((1..=7).map(rec));
        let reader = PageReader::new(&store, 3);

        let mut offset = 0;
        let mut non_empty = 0;
        let mut seen = Vec::new();
        loop {
            let page = reader.next_page(offset).await.unwrap();
            if page.is_empty() {
                break;
            }
            non_empty += 1;
            seen.extend(page.ids());
            offset += reader.page_size();
        }

        assert_eq!(non_empty, 3);
        assert_eq!(seen, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_one_empty_page() {
        let store = MemoryStore::with_records((1..=4).map(rec));
        let reader = PageReader::new(&store, 2);
        assert_eq!(reader.next_page(0).await.unwrap().len(), 2);
        assert_eq!(reader.next_page(2).await.unwrap().len(), 2);
        assert!(reader.next_page(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_indexed_rows_are_not_fetched() {
        let store = MemoryStore::with_records([
            rec(1),
            rec(2).with(Field::Index, Datum::Int64(40)),
            rec(3),
        ]);
        let page = PageReader::new(&store, 10).next_page(0).await.unwrap();
        assert_eq!(page.ids(), vec![1, 3]);
    }
}
