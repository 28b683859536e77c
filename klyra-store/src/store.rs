//! In-memory board tables: projects, columns, cards, and activities.
//!
//! A single card write slots the card in at its new index and renumbers the
//! columns it left and joined, so writing only the moved card is enough to
//! keep stored positions equal to the client's. Batch writes overwrite
//! orders as given. Every write stamps a monotonically increasing
//! `updated_seq`; reads sort by (`order`, `updated_seq`) and renumber
//! densely.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use klyra_proto::audit::{ActionType, AuditRecord, MoveDetails, Timestamp};
use klyra_proto::board::{Board, Column, ColumnId, Priority, ProjectId, Task, TaskId};
use klyra_proto::list;
use klyra_proto::planner::TaskReorder;
use klyra_proto::store::{BoardLocator, PositionUpdate};

use crate::seed::{Seed, SeedError};

/// Reasons the store refuses a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// No project with that id.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// No project behind that access link.
    #[error("unknown access link: {0}")]
    AccessLinkNotFound(String),

    /// No card with that id.
    #[error("card not found: {0}")]
    CardNotFound(TaskId),

    /// No column with that id.
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),

    /// The target column belongs to another project than the card.
    #[error("card {card} cannot move to column {column} of another project")]
    CrossProjectMove {
        /// The card being written.
        card: TaskId,
        /// The foreign column.
        column: ColumnId,
    },
}

/// A `projects` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    /// Project id.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Client the project is for.
    pub client_name: Option<String>,
    /// Shareable link token.
    pub access_link: String,
    /// Project status, e.g. `active`.
    pub status: String,
}

/// A `columns` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    /// Column id.
    pub id: ColumnId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Column heading.
    pub name: String,
    /// Position within the board.
    pub order: u32,
}

/// A `cards` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRow {
    /// Card id.
    pub id: TaskId,
    /// Owning column.
    pub column_id: ColumnId,
    /// Title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Priority as stored.
    pub priority: Option<String>,
    /// Position as last written; not necessarily dense.
    pub order: u32,
    /// Write sequence number, breaks ties between equal orders.
    pub updated_seq: u64,
}

/// An `activities` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    /// Server-generated id.
    pub id: Uuid,
    /// Project the activity belongs to.
    pub project_id: ProjectId,
    /// Card the activity is about.
    pub card_id: TaskId,
    /// What happened.
    pub action_type: ActionType,
    /// Action payload.
    pub action_details: MoveDetails,
    /// Who did it.
    pub performed_by: String,
    /// When the client recorded it.
    pub performed_at: Timestamp,
}

#[derive(Default)]
struct Tables {
    projects: HashMap<ProjectId, ProjectRow>,
    access_links: HashMap<String, ProjectId>,
    columns: HashMap<ColumnId, ColumnRow>,
    cards: BTreeMap<TaskId, CardRow>,
    activities: Vec<ActivityRow>,
    next_seq: u64,
}

impl Tables {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn resolve(&self, locator: &BoardLocator) -> Result<ProjectId, DbError> {
        match locator {
            BoardLocator::Project(id) if self.projects.contains_key(id) => Ok(id.clone()),
            BoardLocator::Project(id) => Err(DbError::ProjectNotFound(id.clone())),
            BoardLocator::AccessLink(link) => self
                .access_links
                .get(link)
                .cloned()
                .ok_or_else(|| DbError::AccessLinkNotFound(link.clone())),
        }
    }

    fn project_of_card(&self, card_id: &TaskId) -> Result<&ProjectId, DbError> {
        let card = self
            .cards
            .get(card_id)
            .ok_or_else(|| DbError::CardNotFound(card_id.clone()))?;
        self.columns
            .get(&card.column_id)
            .map(|c| &c.project_id)
            .ok_or_else(|| DbError::ColumnNotFound(card.column_id.clone()))
    }

    fn check_position(&self, update: &PositionUpdate) -> Result<(), DbError> {
        let card_project = self.project_of_card(&update.task_id)?;
        let column = self
            .columns
            .get(&update.column_id)
            .ok_or_else(|| DbError::ColumnNotFound(update.column_id.clone()))?;
        if &column.project_id != card_project {
            return Err(DbError::CrossProjectMove {
                card: update.task_id.clone(),
                column: update.column_id.clone(),
            });
        }
        Ok(())
    }

    /// Slots a card in at index `order` of `column_id` and renumbers the
    /// column it left and the column it joined.
    fn place_card(&mut self, task_id: &TaskId, column_id: &ColumnId, order: u32) {
        let Some(from) = self.cards.get(task_id).map(|c| c.column_id.clone()) else {
            return;
        };
        let others = self
            .card_ids(column_id)
            .into_iter()
            .filter(|id| id != task_id)
            .collect();
        let dest = list::insert_at(others, order as usize, task_id.clone());

        let seq = self.bump_seq();
        if let Some(card) = self.cards.get_mut(task_id) {
            card.column_id = column_id.clone();
            card.updated_seq = seq;
        }
        self.renumber(&dest);
        if &from != column_id {
            let source = self.card_ids(&from);
            self.renumber(&source);
        }
    }

    /// Overwrites one card's order without touching its neighbours.
    fn apply_order(&mut self, task_id: &TaskId, order: u32) {
        let seq = self.bump_seq();
        if let Some(card) = self.cards.get_mut(task_id) {
            card.order = order;
            card.updated_seq = seq;
        }
    }

    /// Card ids of a column in display order.
    fn card_ids(&self, column_id: &ColumnId) -> Vec<TaskId> {
        let mut cards: Vec<&CardRow> = self
            .cards
            .values()
            .filter(|card| &card.column_id == column_id)
            .collect();
        cards.sort_by_key(|card| (card.order, card.updated_seq));
        cards.into_iter().map(|card| card.id.clone()).collect()
    }

    fn renumber(&mut self, ids: &[TaskId]) {
        for (order, id) in (0u32..).zip(ids) {
            if let Some(card) = self.cards.get_mut(id) {
                card.order = order;
            }
        }
    }

    fn board(&self, project_id: &ProjectId) -> Board {
        let mut columns: Vec<&ColumnRow> = self
            .columns
            .values()
            .filter(|c| &c.project_id == project_id)
            .collect();
        columns.sort_by_key(|c| (c.order, c.id.clone()));

        let columns = columns
            .into_iter()
            .map(|column| {
                let mut cards: Vec<&CardRow> = self
                    .cards
                    .values()
                    .filter(|card| card.column_id == column.id)
                    .collect();
                cards.sort_by_key(|card| (card.order, card.updated_seq));
                let tasks = cards.into_iter().map(card_to_task).collect();
                Column::new(column.id.clone(), column.name.clone()).with_tasks(tasks)
            })
            .collect();
        Board::new(project_id.clone(), columns)
    }
}

fn card_to_task(card: &CardRow) -> Task {
    let mut task = Task::new(card.id.clone(), card.title.clone())
        .with_priority(Priority::from_stored(card.priority.as_deref()));
    task.description.clone_from(&card.description);
    task.due_date = card.due_date;
    task
}

/// The store's tables behind one lock.
#[derive(Default)]
pub struct BoardDb {
    tables: RwLock<Tables>,
}

impl BoardDb {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store populated from a seed.
    ///
    /// Projects without an access link get a generated one.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::DuplicateId`] if an id repeats.
    pub fn from_seed(seed: Seed) -> Result<Self, SeedError> {
        let mut tables = Tables::default();
        for project in seed.projects {
            let project_id = ProjectId::new(project.id);
            if tables.projects.contains_key(&project_id) {
                return Err(duplicate("project", &project_id));
            }
            let access_link = project
                .access_link
                .unwrap_or_else(|| Uuid::now_v7().simple().to_string());
            if tables.access_links.contains_key(&access_link) {
                return Err(duplicate("access link", &access_link));
            }

            for (column_order, column) in (0u32..).zip(project.columns) {
                let column_id = ColumnId::new(column.id);
                if tables.columns.contains_key(&column_id) {
                    return Err(duplicate("column", &column_id));
                }
                for (card_order, card) in (0u32..).zip(column.cards) {
                    let card_id = TaskId::new(card.id);
                    if tables.cards.contains_key(&card_id) {
                        return Err(duplicate("card", &card_id));
                    }
                    tables.cards.insert(
                        card_id.clone(),
                        CardRow {
                            id: card_id,
                            column_id: column_id.clone(),
                            title: card.title,
                            description: card.description,
                            due_date: card.due_date,
                            priority: card.priority,
                            order: card_order,
                            updated_seq: 0,
                        },
                    );
                }
                tables.columns.insert(
                    column_id.clone(),
                    ColumnRow {
                        id: column_id,
                        project_id: project_id.clone(),
                        name: column.name,
                        order: column_order,
                    },
                );
            }

            tables
                .access_links
                .insert(access_link.clone(), project_id.clone());
            tables.projects.insert(
                project_id.clone(),
                ProjectRow {
                    id: project_id,
                    name: project.name,
                    client_name: project.client_name,
                    access_link,
                    status: project.status,
                },
            );
        }
        tracing::info!(
            projects = tables.projects.len(),
            cards = tables.cards.len(),
            "store seeded"
        );
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// Returns a project row.
    pub async fn project(&self, project_id: &ProjectId) -> Option<ProjectRow> {
        self.tables.read().await.projects.get(project_id).cloned()
    }

    /// Loads a board, columns and cards in display order with dense orders.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ProjectNotFound`] or [`DbError::AccessLinkNotFound`].
    pub async fn fetch_board(&self, locator: &BoardLocator) -> Result<Board, DbError> {
        let tables = self.tables.read().await;
        let project_id = tables.resolve(locator)?;
        Ok(tables.board(&project_id))
    }

    /// Moves one card to index `order` of a column.
    ///
    /// The other cards of the columns it left and joined are renumbered so
    /// orders stay dense.
    ///
    /// # Errors
    ///
    /// Rejects an unknown card or column, or a column of another project.
    pub async fn update_task_position(&self, update: &PositionUpdate) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.check_position(update)?;
        tables.place_card(&update.task_id, &update.column_id, update.order);
        Ok(())
    }

    /// Writes a moved card plus the orders of the cards it shifted.
    ///
    /// Either every row is written or none is.
    ///
    /// # Errors
    ///
    /// Same as [`update_task_position`](Self::update_task_position), plus
    /// [`DbError::CardNotFound`] for an unknown reordered card and
    /// [`DbError::CrossProjectMove`] for one in another project.
    pub async fn update_task_positions(
        &self,
        moved: &PositionUpdate,
        reorders: &[TaskReorder],
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.check_position(moved)?;
        let project_id = tables.project_of_card(&moved.task_id)?.clone();
        for reorder in reorders {
            if tables.project_of_card(&reorder.task_id)? != &project_id {
                return Err(DbError::CrossProjectMove {
                    card: reorder.task_id.clone(),
                    column: moved.column_id.clone(),
                });
            }
        }

        tables.place_card(&moved.task_id, &moved.column_id, moved.order);
        for reorder in reorders {
            tables.apply_order(&reorder.task_id, reorder.new_order);
        }
        Ok(())
    }

    /// Appends an activity row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ProjectNotFound`] for an unknown project.
    pub async fn insert_activity(&self, record: &AuditRecord) -> Result<Uuid, DbError> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&record.project_id) {
            return Err(DbError::ProjectNotFound(record.project_id.clone()));
        }
        let id = Uuid::now_v7();
        tables.activities.push(ActivityRow {
            id,
            project_id: record.project_id.clone(),
            card_id: record.task_id.clone(),
            action_type: record.action_type,
            action_details: record.details.clone(),
            performed_by: record.performed_by.clone(),
            performed_at: record.timestamp,
        });
        Ok(id)
    }

    /// Activities of a project, oldest first.
    pub async fn activities(&self, project_id: &ProjectId) -> Vec<ActivityRow> {
        self.tables
            .read()
            .await
            .activities
            .iter()
            .filter(|a| &a.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Raw card row, as last written.
    pub async fn card(&self, card_id: &TaskId) -> Option<CardRow> {
        self.tables.read().await.cards.get(card_id).cloned()
    }
}

fn duplicate(kind: &'static str, id: &impl ToString) -> SeedError {
    SeedError::DuplicateId {
        kind,
        id: id.to_string(),
    }
}
