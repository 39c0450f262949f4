//! Falling-entity simulation that exercises the vector pool every tick.
//!
//! Each tick performs an Euler position approximation per entity. The
//! transient vectors of that math are leased from a bounded pool inside a
//! scope and the results are copied out into the long-lived entity state
//! before the scope exits. The unpooled variant allocates fresh vectors
//! instead, for an allocation-count comparison.

use glam::Vec2;

use crate::pool::{Pool, PoolError};
use crate::vector::{vec2_pool, PoolVec2};

/// Entities simulated per tick.
pub const ENTITY_COUNT: usize = 200;
/// Playfield extent; entities spawn anywhere inside.
pub const FIELD_SIZE: f32 = 400.0;
/// Downward acceleration (units/s^2).
const GRAVITY: f32 = 100.0;
/// Transient vectors available per tick. Undersizing or leaking shows up
/// as pool exhaustion.
const POOL_CAPACITY: usize = 100;
/// Fraction of velocity kept after a floor bounce.
const BOUNCE_DAMPING: f32 = 0.7;
/// Minimum bounce speed before an entity comes to rest.
const REST_THRESHOLD: f32 = 1.0;
/// Half-extent of an entity; keeps the bounce point above the floor line.
const ENTITY_HALF: f32 = 5.0;

/// Long-lived state owned by the simulation. Transient math never lives
/// here.
pub struct Entity {
    pub pos: Vec2,
    pub vel: Vec2,
}

pub struct Sim {
    pub entities: Vec<Entity>,
    pool: Pool<PoolVec2>,
}

impl Sim {
    pub fn new(rng: &mut fastrand::Rng) -> Self {
        let mut entities = Vec::with_capacity(ENTITY_COUNT);
        for _ in 0..ENTITY_COUNT {
            entities.push(Entity {
                pos: Vec2::new(rng.f32() * FIELD_SIZE, rng.f32() * FIELD_SIZE),
                vel: Vec2::ZERO,
            });
        }
        Self {
            entities,
            pool: vec2_pool(POOL_CAPACITY),
        }
    }

    pub fn pool(&self) -> &Pool<PoolVec2> {
        &self.pool
    }

    /// Euler step with pooled transients. Every vector leased inside an
    /// entity's scope is back in the free list before the next entity runs.
    pub fn step_pooled(&mut self, dt: f32) -> Result<(), PoolError> {
        let pool = self.pool.clone();
        for entity in &mut self.entities {
            pool.using(|p| -> Result<(), PoolError> {
                let position = p.get((entity.pos.x, entity.pos.y))?;
                let velocity = p.get((entity.vel.x, entity.vel.y))?;
                let acceleration = p.get((0.0, GRAVITY))?;

                // v' = v + a*dt
                let dv = acceleration.scale(dt)?;
                let final_velocity = velocity.add(&dv)?;

                // x' = x + v*dt + a*dt^2/2
                let v_dt = velocity.scale(dt)?;
                let a_term = acceleration.scale(0.5 * dt * dt)?;
                let moved = position.add(&v_dt)?;
                let final_position = moved.add(&a_term)?;

                // Copy out before the scope reclaims the transients.
                entity.pos = final_position.as_vec2();
                entity.vel = final_velocity.as_vec2();
                Ok(())
            })?;
            bounce(entity);
        }
        Ok(())
    }

    /// Same integration with fresh vectors every tick. The derived ops
    /// never touch a pool here, so the `Result` is always `Ok`.
    pub fn step_unpooled(&mut self, dt: f32) -> Result<(), PoolError> {
        for entity in &mut self.entities {
            let position = PoolVec2::new(entity.pos.x, entity.pos.y);
            let velocity = PoolVec2::new(entity.vel.x, entity.vel.y);
            let acceleration = PoolVec2::new(0.0, GRAVITY);

            let dv = acceleration.scale(dt)?;
            let final_velocity = velocity.add(&dv)?;

            let v_dt = velocity.scale(dt)?;
            let a_term = acceleration.scale(0.5 * dt * dt)?;
            let moved = position.add(&v_dt)?;
            let final_position = moved.add(&a_term)?;

            entity.pos = final_position.as_vec2();
            entity.vel = final_velocity.as_vec2();
            bounce(entity);
        }
        Ok(())
    }
}

/// Floor bounce with damping, applied after integration.
fn bounce(entity: &mut Entity) {
    let floor = FIELD_SIZE - ENTITY_HALF;
    if entity.pos.y > floor {
        entity.pos.y = floor;
        entity.vel.y = if entity.vel.y.abs() < REST_THRESHOLD {
            0.0
        } else {
            -(entity.vel.y * BOUNCE_DAMPING)
        };
    }
}
