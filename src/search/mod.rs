//! Tantivy-based search index module.
//!
//! Provides full-text search over teams with field boosting. The index is a
//! derived view of the database: rebuilt at start-up, kept current by the
//! team and tournament handlers.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Team;

/// Field boost values.
const BOOST_NAME: f32 = 10.0;
const BOOST_TOURNAMENT: f32 = 5.0;
const BOOST_SPORT: f32 = 4.0;
const BOOST_CITY: f32 = 4.0;

/// Search hit with relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub team_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    team_id: Field,
    tournament_id: Field,
    name: Field,
    tournament: Field,
    sport: Field,
    city: Field,
}

/// Tantivy search index for teams.
pub struct TeamIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl TeamIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        // Ids are indexed untokenized so documents can be deleted by term
        let mut schema_builder = Schema::builder();
        let team_id = schema_builder.add_text_field("team_id", STRING | STORED);
        let tournament_id = schema_builder.add_text_field("tournament_id", STRING);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let tournament = schema_builder.add_text_field("tournament", TEXT);
        let sport = schema_builder.add_text_field("sport", TEXT);
        let city = schema_builder.add_text_field("city", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            team_id,
            tournament_id,
            name,
            tournament,
            sport,
            city,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from teams.
    pub async fn rebuild(&self, teams: &[Team]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for team in teams {
            writer.add_document(self.create_document(team))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} teams", teams.len());
        Ok(())
    }

    /// Index or re-index teams.
    pub async fn index_teams(&self, teams: &[Team]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        for team in teams {
            writer.delete_term(Term::from_field_text(self.fields.team_id, &team.id));
            writer.add_document(self.create_document(team))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a team from the index.
    pub async fn remove_team(&self, team_id: &str) -> Result<(), AppError> {
        self.remove_by(Term::from_field_text(self.fields.team_id, team_id))
            .await
    }

    /// Remove every team of a tournament from the index.
    pub async fn remove_tournament(&self, tournament_id: &str) -> Result<(), AppError> {
        self.remove_by(Term::from_field_text(
            self.fields.tournament_id,
            tournament_id,
        ))
        .await
    }

    async fn remove_by(&self, term: Term) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for teams matching the query, best match first.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let field_queries = [
            (self.fields.name, BOOST_NAME),
            (self.fields.tournament, BOOST_TOURNAMENT),
            (self.fields.sport, BOOST_SPORT),
            (self.fields.city, BOOST_CITY),
        ];

        let query_parser = QueryParser::for_index(
            &self.index,
            field_queries.iter().map(|(field, _)| *field).collect(),
        );
        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::BadRequest(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let team_id = doc.get_first(self.fields.team_id)?.as_str()?.to_string();
                Some(SearchResult { team_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, team: &Team) -> TantivyDocument {
        doc!(
            self.fields.team_id => team.id.clone(),
            self.fields.tournament_id => team.tournament_id.clone(),
            self.fields.name => team.name.clone(),
            self.fields.tournament => team.tournament_name.clone(),
            self.fields.sport => team.sport.clone(),
            self.fields.city => team.city.clone()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_team(id: &str, name: &str, tournament_id: &str, city: &str) -> Team {
        Team {
            id: id.to_string(),
            name: name.to_string(),
            tournament_id: tournament_id.to_string(),
            tournament_name: "Summer League".to_string(),
            sport: "football".to_string(),
            city: city.to_string(),
            organizer_id: "o1".to_string(),
            max_capacity: 11,
            current_capacity: 0,
            is_full: false,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_by_name_and_city() {
        let temp_dir = TempDir::new().unwrap();
        let index = TeamIndex::open(temp_dir.path()).unwrap();

        let teams = vec![
            create_test_team("1", "Red Dragons", "tr1", "Lyon"),
            create_test_team("2", "Blue Sharks", "tr1", "Marseille"),
        ];
        index.rebuild(&teams).await.unwrap();

        let results = index.search("dragons", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].team_id, "1");

        let results = index.search("marseille", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].team_id, "2");
    }

    #[tokio::test]
    async fn test_reindex_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let index = TeamIndex::open(temp_dir.path()).unwrap();

        let mut team = create_test_team("1", "Red Dragons", "tr1", "Lyon");
        index.index_teams(std::slice::from_ref(&team)).await.unwrap();

        team.name = "Green Owls".to_string();
        index.index_teams(std::slice::from_ref(&team)).await.unwrap();
        assert!(index.search("dragons", 10, 0).unwrap().is_empty());
        assert_eq!(index.search("owls", 10, 0).unwrap().len(), 1);

        index.remove_team("1").await.unwrap();
        assert!(index.search("owls", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_tournament_drops_its_teams() {
        let temp_dir = TempDir::new().unwrap();
        let index = TeamIndex::open(temp_dir.path()).unwrap();

        index
            .rebuild(&[
                create_test_team("1", "Red Dragons", "tr1", "Lyon"),
                create_test_team("2", "Red Foxes", "tr2", "Lyon"),
            ])
            .await
            .unwrap();

        index.remove_tournament("tr1").await.unwrap();
        let results = index.search("red", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].team_id, "2");
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = TeamIndex::open(temp_dir.path()).unwrap();

        let results = index.search("", 10, 0).unwrap();
        assert!(results.is_empty());
    }
}
