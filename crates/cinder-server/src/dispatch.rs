//! Command dispatch.
//!
//! Takes a tokenized command line plus the issuing client id and
//! produces the reply text. Per command the order is fixed: check
//! transaction queueing, append to the log when the command mutates,
//! run the handler, return the reply. Engine errors surface as `-ERR`
//! replies; nothing panics across this boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::error;

use cinder_core::keyspace::{BitOp, BitfieldType};
use cinder_core::types::stream::StreamEntry;
use cinder_core::types::timeseries::{Aggregation, TsPoint};
use cinder_core::TtlResult;
use cinder_protocol::{join_tokens, tokenize, Reply};

use crate::db::Db;
use crate::ClientId;

/// Dispatches one raw command line and renders the reply.
pub fn dispatch(db: &Arc<Db>, client: ClientId, line: &str) -> String {
    let tokens = tokenize(line);
    execute(db, client, &tokens).to_wire()
}

/// Executes a tokenized command.
pub fn execute(db: &Arc<Db>, client: ClientId, tokens: &[String]) -> Reply {
    let Some(first) = tokens.first() else {
        return Reply::error("empty command");
    };
    let name = first.to_ascii_uppercase();

    // a client in MULTI state queues everything except the two
    // transaction control commands
    if db.txns.in_txn(client) && !matches!(name.as_str(), "EXEC" | "DISCARD") {
        db.txns.queue(client, join_tokens(tokens));
        return Reply::Simple("QUEUED".into());
    }

    // mutations hit the log before the handler runs, so the reply only
    // goes out once the command is durable
    if is_mutating(&name, tokens) {
        if let Err(e) = db.append_aof(&join_tokens(tokens)) {
            error!("append-only log write failed: {e}");
            return Reply::error(format!("append-only log write failed: {e}"));
        }
    }

    let args = &tokens[1..];
    let result = match name.as_str() {
        "MULTI" => {
            db.txns.begin(client);
            Ok(Reply::ok())
        }
        "EXEC" => exec_txn(db, client),
        "DISCARD" => {
            if db.txns.discard(client) {
                Ok(Reply::ok())
            } else {
                Err(Reply::error("no transaction started"))
            }
        }

        "SET" => cmd_set(db, args),
        "GET" => cmd_get(db, args),
        "DEL" => cmd_del(db, args),
        "EXISTS" => cmd_exists(db, args),
        "QUIT" => Ok(Reply::ok()),
        "EX" => cmd_ex(db, args),
        "TTL" => cmd_ttl(db, args),
        "PERSIST" => cmd_persist(db, args),
        "KEYS" => cmd_keys(db, args),

        "APPEND" => cmd_append(db, args),
        "STRLEN" => cmd_strlen(db, args),
        "INCR" => cmd_incr_by(db, args, 1, false),
        "DECR" => cmd_incr_by(db, args, -1, false),
        "INCRBY" => cmd_incr_by(db, args, 1, true),
        "DECRBY" => cmd_incr_by(db, args, -1, true),
        "GETRANGE" => cmd_getrange(db, args),
        "SETRANGE" => cmd_setrange(db, args),

        "LPUSH" => cmd_push(db, args, true),
        "RPUSH" => cmd_push(db, args, false),
        "LPOP" => cmd_pop(db, args, true),
        "RPOP" => cmd_pop(db, args, false),
        "LLEN" => cmd_llen(db, args),
        "LRANGE" => cmd_lrange(db, args),

        "HSET" => cmd_hset(db, args),
        "HGET" => cmd_hget(db, args),
        "HMSET" => cmd_hmset(db, args),
        "HGETALL" => cmd_hgetall(db, args),
        "HDEL" => cmd_hdel(db, args),
        "HEXISTS" => cmd_hexists(db, args),

        "SADD" => cmd_sadd(db, args),
        "SREM" => cmd_srem(db, args),
        "SMEMBERS" => cmd_smembers(db, args),
        "SISMEMBER" => cmd_sismember(db, args),
        "SUNION" => cmd_set_combine(db, args, SetCombine::Union),
        "SINTER" => cmd_set_combine(db, args, SetCombine::Inter),
        "SDIFF" => cmd_set_combine(db, args, SetCombine::Diff),

        "ZADD" => cmd_zadd(db, args),
        "ZRANGE" => cmd_zrange(db, args),
        "ZRANK" => cmd_zrank(db, args),
        "ZREM" => cmd_zrem(db, args),
        "ZRANGEBYSCORE" => cmd_zrangebyscore(db, args),

        "JSON.SET" => cmd_json_set(db, args),
        "JSON.GET" => cmd_json_get(db, args),
        "JSON.DEL" => cmd_json_del(db, args),
        "JSON.ARRAPPEND" => cmd_json_arrappend(db, args),

        "SETBIT" => cmd_setbit(db, args),
        "GETBIT" => cmd_getbit(db, args),
        "BITCOUNT" => cmd_bitcount(db, args),
        "BITOP" => cmd_bitop(db, args),
        "BITFIELD" => cmd_bitfield(db, args),

        "PFADD" => cmd_pfadd(db, args),
        "PFCOUNT" => cmd_pfcount(db, args),
        "PFMERGE" => cmd_pfmerge(db, args),

        "GEOADD" => cmd_geoadd(db, args),
        "GEODIST" => cmd_geodist(db, args),
        "GEORADIUS" => cmd_georadius(db, args),

        "XADD" => cmd_xadd(db, args),
        "XREAD" => cmd_xread(db, args),
        "XRANGE" => cmd_xrange(db, args),
        "XLEN" => cmd_xlen(db, args),
        "XGROUP" => cmd_xgroup(db, args),
        "XREADGROUP" => cmd_xreadgroup(db, args),
        "XACK" => cmd_xack(db, args),

        "TS.CREATE" => cmd_ts_create(db, args),
        "TS.ADD" => cmd_ts_add(db, args),
        "TS.RANGE" => cmd_ts_range(db, args),
        "TS.GET" => cmd_ts_get(db, args),

        "VECTOR.SET" => cmd_vector_set(db, args),
        "VECTOR.GET" => cmd_vector_get(db, args),
        "VECTOR.SEARCH" => cmd_vector_search(db, args),

        "SUBSCRIBE" | "SUB" => cmd_subscribe(db, client, args),
        "UNSUBSCRIBE" => cmd_unsubscribe(db, client, args),
        "PUBLISH" | "PUB" => cmd_publish(db, args),

        "SAVE" => cmd_save(db),
        "RESTORE" => cmd_restore(db),
        "BGSAVE" => cmd_bgsave(db),
        "AOF" => cmd_aof(db, args),

        _ => Err(Reply::error(format!("unknown command '{first}'"))),
    };

    result.unwrap_or_else(|err| err)
}

/// Commands that change state and therefore land in the log. BITFIELD
/// only mutates for its SET/INCRBY actions.
fn is_mutating(name: &str, tokens: &[String]) -> bool {
    match name {
        "SET" | "DEL" | "EX" | "PERSIST" | "APPEND" | "INCR" | "DECR" | "INCRBY" | "DECRBY"
        | "SETRANGE" | "LPUSH" | "RPUSH" | "LPOP" | "RPOP" | "HSET" | "HMSET" | "HDEL"
        | "SADD" | "SREM" | "ZADD" | "ZREM" | "JSON.SET" | "JSON.DEL" | "JSON.ARRAPPEND"
        | "SETBIT" | "BITOP" | "PFADD" | "PFMERGE" | "GEOADD" | "XADD" | "XGROUP"
        | "XREADGROUP" | "XACK" | "TS.CREATE" | "TS.ADD" | "VECTOR.SET" => true,
        "BITFIELD" => tokens
            .get(2)
            .is_some_and(|action| !action.eq_ignore_ascii_case("GET")),
        _ => false,
    }
}

fn exec_txn(db: &Arc<Db>, client: ClientId) -> Result<Reply, Reply> {
    let Some(queued) = db.txns.take(client) else {
        return Err(Reply::error("no transaction started"));
    };
    let replies: Vec<String> = queued
        .iter()
        .map(|line| dispatch(db, client, line))
        .collect();
    Ok(Reply::Raw(replies.join("\r\n")))
}

// -- argument helpers ------------------------------------------------------

fn arity(args: &[String], want: usize, cmd: &str) -> Result<(), Reply> {
    if args.len() != want {
        return Err(Reply::error(format!(
            "wrong number of arguments for '{cmd}'"
        )));
    }
    Ok(())
}

fn arity_min(args: &[String], want: usize, cmd: &str) -> Result<(), Reply> {
    if args.len() < want {
        return Err(Reply::error(format!(
            "wrong number of arguments for '{cmd}'"
        )));
    }
    Ok(())
}

fn int_arg(s: &str, what: &str) -> Result<i64, Reply> {
    s.parse()
        .map_err(|_| Reply::error(format!("{what} must be an integer")))
}

fn uint_arg(s: &str, what: &str) -> Result<usize, Reply> {
    s.parse()
        .map_err(|_| Reply::error(format!("{what} must be a non-negative integer")))
}

fn float_arg(s: &str, what: &str) -> Result<f64, Reply> {
    match s.parse::<f64>() {
        Ok(v) if !v.is_nan() => Ok(v),
        _ => Err(Reply::error(format!("{what} must be a float"))),
    }
}

fn engine_err(e: impl std::fmt::Display) -> Reply {
    Reply::error(e)
}

// -- keyspace / string commands --------------------------------------------

fn cmd_set(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "SET")?;
    let ttl = match args.len() {
        2 => None,
        4 if args[2].eq_ignore_ascii_case("EX") => {
            let secs = int_arg(&args[3], "TTL")?;
            if secs <= 0 {
                return Err(Reply::error("invalid TTL"));
            }
            Some(std::time::Duration::from_secs(secs as u64))
        }
        _ => return Err(Reply::error("syntax error in SET")),
    };
    db.keyspace.write().set(&args[0], args[1].clone(), ttl);
    Ok(Reply::ok())
}

fn cmd_get(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "GET")?;
    match db.keyspace.write().get(&args[0]).map_err(engine_err)? {
        Some(value) => Ok(Reply::Bulk(value)),
        None => Ok(Reply::Nil),
    }
}

fn cmd_del(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "DEL")?;
    Ok(Reply::Integer(i64::from(db.keyspace.write().del(&args[0]))))
}

fn cmd_exists(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "EXISTS")?;
    Ok(Reply::Integer(i64::from(
        db.keyspace.read().exists(&args[0]),
    )))
}

fn cmd_ex(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "EX")?;
    let secs = int_arg(&args[1], "duration")?;
    if secs < 0 {
        return Err(Reply::error("duration must be a non-negative integer"));
    }
    db.keyspace.write().expire(&args[0], secs as u64);
    Ok(Reply::ok())
}

fn cmd_ttl(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "TTL")?;
    let reply = match db.keyspace.write().ttl(&args[0]) {
        TtlResult::Seconds(s) => Reply::Integer(s),
        TtlResult::NoExpiry => Reply::Integer(-1),
        TtlResult::NotFound => Reply::Integer(-2),
    };
    Ok(reply)
}

fn cmd_persist(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "PERSIST")?;
    Ok(Reply::Integer(i64::from(
        db.keyspace.write().persist(&args[0]),
    )))
}

fn cmd_keys(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "KEYS")?;
    let mut keys = db.keyspace.read().keys(&args[0]);
    keys.sort();
    Ok(Reply::Array(keys))
}

fn cmd_append(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "APPEND")?;
    let len = db
        .keyspace
        .write()
        .append(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

fn cmd_strlen(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "STRLEN")?;
    let len = db.keyspace.write().strlen(&args[0]).map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

/// INCR/DECR (`with_amount = false`) and INCRBY/DECRBY (`true`).
/// `sign` is +1 or -1.
fn cmd_incr_by(
    db: &Arc<Db>,
    args: &[String],
    sign: i64,
    with_amount: bool,
) -> Result<Reply, Reply> {
    let delta = if with_amount {
        arity(args, 2, "INCRBY")?;
        let amount = int_arg(&args[1], "increment")?;
        amount.checked_mul(sign).ok_or_else(|| {
            Reply::error("increment or decrement would overflow")
        })?
    } else {
        arity(args, 1, "INCR")?;
        sign
    };
    let value = db
        .keyspace
        .write()
        .incr_by(&args[0], delta)
        .map_err(engine_err)?;
    Ok(Reply::Integer(value))
}

fn cmd_getrange(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "GETRANGE")?;
    let start = int_arg(&args[1], "start")?;
    let end = int_arg(&args[2], "end")?;
    let slice = db
        .keyspace
        .write()
        .getrange(&args[0], start, end)
        .map_err(engine_err)?;
    Ok(Reply::Bulk(slice))
}

fn cmd_setrange(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "SETRANGE")?;
    let offset = uint_arg(&args[1], "offset")?;
    let len = db
        .keyspace
        .write()
        .setrange(&args[0], offset, &args[2])
        .map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

// -- list commands ---------------------------------------------------------

fn cmd_push(db: &Arc<Db>, args: &[String], front: bool) -> Result<Reply, Reply> {
    arity_min(args, 2, if front { "LPUSH" } else { "RPUSH" })?;
    let values = args[1..].to_vec();
    let mut keyspace = db.keyspace.write();
    let len = if front {
        keyspace.lpush(&args[0], values)
    } else {
        keyspace.rpush(&args[0], values)
    }
    .map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

fn cmd_pop(db: &Arc<Db>, args: &[String], front: bool) -> Result<Reply, Reply> {
    arity(args, 1, if front { "LPOP" } else { "RPOP" })?;
    let mut keyspace = db.keyspace.write();
    let popped = if front {
        keyspace.lpop(&args[0])
    } else {
        keyspace.rpop(&args[0])
    }
    .map_err(engine_err)?;
    Ok(popped.map_or(Reply::Nil, Reply::Bulk))
}

fn cmd_llen(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "LLEN")?;
    let len = db.keyspace.write().llen(&args[0]).map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

fn cmd_lrange(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "LRANGE")?;
    let start = int_arg(&args[1], "start")?;
    let stop = int_arg(&args[2], "end")?;
    let items = db
        .keyspace
        .write()
        .lrange(&args[0], start, stop)
        .map_err(engine_err)?;
    Ok(Reply::Array(items))
}

// -- hash commands ---------------------------------------------------------

fn cmd_hset(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "HSET")?;
    let added = db
        .keyspace
        .write()
        .hset(&args[0], &args[1], args[2].clone())
        .map_err(engine_err)?;
    Ok(Reply::Integer(added as i64))
}

fn cmd_hget(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "HGET")?;
    let value = db
        .keyspace
        .write()
        .hget(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(value.map_or(Reply::Nil, Reply::Bulk))
}

fn cmd_hmset(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return Err(Reply::error("HMSET requires key and field-value pairs"));
    }
    let fields = args[1..]
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    db.keyspace
        .write()
        .hmset(&args[0], fields)
        .map_err(engine_err)?;
    Ok(Reply::ok())
}

fn cmd_hgetall(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "HGETALL")?;
    match db.keyspace.write().hgetall(&args[0]).map_err(engine_err)? {
        None => Ok(Reply::Nil),
        Some(pairs) => {
            let mut items = Vec::with_capacity(pairs.len() * 2);
            for (field, value) in pairs {
                items.push(field);
                items.push(value);
            }
            Ok(Reply::Array(items))
        }
    }
}

fn cmd_hdel(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "HDEL")?;
    let removed = db
        .keyspace
        .write()
        .hdel(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Integer(removed as i64))
}

fn cmd_hexists(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "HEXISTS")?;
    let exists = db
        .keyspace
        .write()
        .hexists(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Integer(i64::from(exists)))
}

// -- set commands ----------------------------------------------------------

fn cmd_sadd(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "SADD")?;
    let added = db
        .keyspace
        .write()
        .sadd(&args[0], args[1..].to_vec())
        .map_err(engine_err)?;
    Ok(Reply::Integer(added as i64))
}

fn cmd_srem(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "SREM")?;
    let removed = db
        .keyspace
        .write()
        .srem(&args[0], &args[1..])
        .map_err(engine_err)?;
    Ok(Reply::Integer(removed as i64))
}

fn cmd_smembers(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "SMEMBERS")?;
    let members = db
        .keyspace
        .write()
        .smembers(&args[0])
        .map_err(engine_err)?;
    Ok(Reply::Array(members))
}

fn cmd_sismember(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "SISMEMBER")?;
    let present = db
        .keyspace
        .write()
        .sismember(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Integer(i64::from(present)))
}

enum SetCombine {
    Union,
    Inter,
    Diff,
}

fn cmd_set_combine(db: &Arc<Db>, args: &[String], how: SetCombine) -> Result<Reply, Reply> {
    let cmd = match how {
        SetCombine::Union => "SUNION",
        SetCombine::Inter => "SINTER",
        SetCombine::Diff => "SDIFF",
    };
    arity_min(args, 1, cmd)?;
    let mut keyspace = db.keyspace.write();
    let members = match how {
        SetCombine::Union => keyspace.sunion(args),
        SetCombine::Inter => keyspace.sinter(args),
        SetCombine::Diff => keyspace.sdiff(args),
    }
    .map_err(engine_err)?;
    Ok(Reply::Array(members))
}

// -- sorted set commands ---------------------------------------------------

fn cmd_zadd(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "ZADD")?;
    let score = float_arg(&args[1], "score")?;
    let added = db
        .keyspace
        .write()
        .zadd(&args[0], score, &args[2])
        .map_err(engine_err)?;
    Ok(Reply::Integer(added as i64))
}

fn cmd_zrange(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "ZRANGE")?;
    let start = int_arg(&args[1], "start")?;
    let stop = int_arg(&args[2], "stop")?;
    let members = db
        .keyspace
        .write()
        .zrange(&args[0], start, stop)
        .map_err(engine_err)?;
    Ok(Reply::Array(members))
}

fn cmd_zrank(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "ZRANK")?;
    let rank = db
        .keyspace
        .write()
        .zrank(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(rank.map_or(Reply::Nil, |r| Reply::Integer(r as i64)))
}

fn cmd_zrem(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "ZREM")?;
    let removed = db
        .keyspace
        .write()
        .zrem(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Integer(i64::from(removed)))
}

fn cmd_zrangebyscore(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "ZRANGEBYSCORE")?;
    let min = float_arg(&args[1], "min")?;
    let max = float_arg(&args[2], "max")?;
    let members = db
        .keyspace
        .write()
        .zrangebyscore(&args[0], min, max)
        .map_err(engine_err)?;
    Ok(Reply::Array(members))
}

// -- JSON commands ---------------------------------------------------------

fn cmd_json_set(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "JSON.SET")?;
    db.keyspace
        .write()
        .json_set(&args[0], &args[1], &args[2])
        .map_err(engine_err)?;
    Ok(Reply::ok())
}

fn cmd_json_get(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "JSON.GET")?;
    let doc = db
        .keyspace
        .write()
        .json_get(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Bulk(doc))
}

fn cmd_json_del(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "JSON.DEL")?;
    db.keyspace
        .write()
        .json_del(&args[0], &args[1])
        .map_err(engine_err)?;
    Ok(Reply::Integer(1))
}

fn cmd_json_arrappend(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 3, "JSON.ARRAPPEND")?;
    let len = db
        .keyspace
        .write()
        .json_arrappend(&args[0], &args[1], &args[2..])
        .map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

// -- bitmap / bitfield commands --------------------------------------------

fn cmd_setbit(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "SETBIT")?;
    let offset = uint_arg(&args[1], "offset")?;
    let bit = match args[2].as_str() {
        "0" => false,
        "1" => true,
        _ => return Err(Reply::error("bit value is not an integer or out of range")),
    };
    let prev = db
        .keyspace
        .write()
        .setbit(&args[0], offset, bit)
        .map_err(engine_err)?;
    Ok(Reply::Integer(prev as i64))
}

fn cmd_getbit(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "GETBIT")?;
    let offset = uint_arg(&args[1], "offset")?;
    let bit = db
        .keyspace
        .write()
        .getbit(&args[0], offset)
        .map_err(engine_err)?;
    Ok(Reply::Integer(bit as i64))
}

fn cmd_bitcount(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "BITCOUNT")?;
    let count = db.keyspace.write().bitcount(&args[0]).map_err(engine_err)?;
    Ok(Reply::Integer(count as i64))
}

fn cmd_bitop(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 3, "BITOP")?;
    let op: BitOp = args[0]
        .parse()
        .map_err(|_| Reply::error("unknown BITOP operation"))?;
    let len = db
        .keyspace
        .write()
        .bitop(op, &args[1], &args[2..])
        .map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

fn cmd_bitfield(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 3, "BITFIELD")?;
    let key = &args[0];
    let action = args[1].to_ascii_uppercase();
    let ty: BitfieldType = args[2].parse().map_err(engine_err)?;

    match action.as_str() {
        "GET" => {
            arity(args, 4, "BITFIELD GET")?;
            let offset = uint_arg(&args[3], "offset")?;
            let value = db
                .keyspace
                .write()
                .bitfield_get(key, ty, offset)
                .map_err(engine_err)?;
            Ok(Reply::Integer(value))
        }
        "SET" => {
            arity(args, 5, "BITFIELD SET")?;
            let offset = uint_arg(&args[3], "offset")?;
            let value = int_arg(&args[4], "value")?;
            let prior = db
                .keyspace
                .write()
                .bitfield_set(key, ty, offset, value)
                .map_err(engine_err)?;
            Ok(Reply::Integer(prior))
        }
        "INCRBY" => {
            arity(args, 5, "BITFIELD INCRBY")?;
            let offset = uint_arg(&args[3], "offset")?;
            let delta = int_arg(&args[4], "increment")?;
            let value = db
                .keyspace
                .write()
                .bitfield_incrby(key, ty, offset, delta)
                .map_err(engine_err)?;
            Ok(Reply::Integer(value))
        }
        other => Err(Reply::error(format!(
            "unsupported BITFIELD action '{other}'"
        ))),
    }
}

// -- HyperLogLog commands --------------------------------------------------

fn cmd_pfadd(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "PFADD")?;
    let changed = db
        .keyspace
        .write()
        .pfadd(&args[0], &args[1..])
        .map_err(engine_err)?;
    Ok(Reply::Integer(i64::from(changed)))
}

fn cmd_pfcount(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 1, "PFCOUNT")?;
    let mut total = 0u64;
    let mut keyspace = db.keyspace.write();
    for key in args {
        total += keyspace.pfcount(key).map_err(engine_err)?;
    }
    Ok(Reply::Integer(total as i64))
}

fn cmd_pfmerge(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "PFMERGE")?;
    db.keyspace
        .write()
        .pfmerge(&args[0], &args[1..])
        .map_err(engine_err)?;
    Ok(Reply::ok())
}

// -- geo commands ----------------------------------------------------------

fn cmd_geoadd(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() < 4 || (args.len() - 1) % 3 != 0 {
        return Err(Reply::error(
            "GEOADD requires key, longitude, latitude, and member",
        ));
    }
    let mut added = 0;
    let mut keyspace = db.keyspace.write();
    for triple in args[1..].chunks(3) {
        let longitude = float_arg(&triple[0], "longitude")?;
        let latitude = float_arg(&triple[1], "latitude")?;
        if keyspace
            .geoadd(&args[0], longitude, latitude, &triple[2])
            .map_err(engine_err)?
        {
            added += 1;
        }
    }
    Ok(Reply::Integer(added))
}

fn cmd_geodist(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "GEODIST")?;
    let km = db
        .keyspace
        .write()
        .geodist(&args[0], &args[1], &args[2])
        .map_err(engine_err)?;
    Ok(Reply::Bulk(format!("{km:.6}")))
}

fn cmd_georadius(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 4, "GEORADIUS")?;
    let longitude = float_arg(&args[1], "longitude")?;
    let latitude = float_arg(&args[2], "latitude")?;
    let radius = float_arg(&args[3], "radius")?;
    let members = db
        .keyspace
        .write()
        .geosearch(&args[0], longitude, latitude, radius)
        .map_err(engine_err)?;
    Ok(Reply::Array(members))
}

// -- stream commands -------------------------------------------------------

/// Renders entries as `"<id> field value ..."` items.
fn entries_reply(entries: Vec<StreamEntry>) -> Reply {
    let items = entries
        .into_iter()
        .map(|entry| {
            let mut parts = vec![entry.id.to_string()];
            for (field, value) in entry.fields {
                parts.push(field);
                parts.push(value);
            }
            parts.join(" ")
        })
        .collect();
    Reply::Array(items)
}

fn cmd_xadd(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() < 4 || (args.len() - 2) % 2 != 0 {
        return Err(Reply::error(
            "XADD requires key, ID, and field-value pairs",
        ));
    }
    let fields: BTreeMap<String, String> = args[2..]
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    let id = db
        .keyspace
        .write()
        .xadd(&args[0], &args[1], fields)
        .map_err(engine_err)?;
    Ok(Reply::Simple(id.to_string()))
}

fn cmd_xread(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() < 2 || args.len() > 3 {
        return Err(Reply::error("XREAD requires key, start ID, and optional count"));
    }
    let count = match args.get(2) {
        Some(c) => uint_arg(c, "count")?,
        None => 0,
    };
    let entries = db
        .keyspace
        .write()
        .xread(&args[0], &args[1], count)
        .map_err(engine_err)?;
    Ok(entries_reply(entries))
}

fn cmd_xrange(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "XRANGE")?;
    let entries = db
        .keyspace
        .write()
        .xrange(&args[0], &args[1], &args[2])
        .map_err(engine_err)?;
    Ok(entries_reply(entries))
}

fn cmd_xlen(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "XLEN")?;
    let len = db.keyspace.write().xlen(&args[0]).map_err(engine_err)?;
    Ok(Reply::Integer(len as i64))
}

fn cmd_xgroup(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() != 3 || !args[0].eq_ignore_ascii_case("CREATE") {
        return Err(Reply::error("XGROUP CREATE requires key and group name"));
    }
    db.keyspace
        .write()
        .xgroup_create(&args[1], &args[2])
        .map_err(engine_err)?;
    Ok(Reply::ok())
}

fn cmd_xreadgroup(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() < 4 || args.len() > 5 {
        return Err(Reply::error(
            "XREADGROUP requires key, group, consumer, and start ID",
        ));
    }
    let count = match args.get(4) {
        Some(c) => uint_arg(c, "count")?,
        None => 0,
    };
    let entries = db
        .keyspace
        .write()
        .xreadgroup(&args[0], &args[1], &args[2], &args[3], count)
        .map_err(engine_err)?;
    Ok(entries_reply(entries))
}

fn cmd_xack(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 3, "XACK")?;
    let acked = db
        .keyspace
        .write()
        .xack(&args[0], &args[1], &args[2..])
        .map_err(engine_err)?;
    Ok(Reply::Integer(acked as i64))
}

// -- time series commands --------------------------------------------------

fn points_reply(points: Vec<TsPoint>) -> Reply {
    let items = points
        .into_iter()
        .map(|p| format!("{} {:.6}", p.timestamp, p.value))
        .collect();
    Reply::Array(items)
}

fn cmd_ts_create(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 2, "TS.CREATE")?;
    let aggregation: Aggregation = args[1].parse().map_err(engine_err)?;
    db.keyspace
        .write()
        .ts_create(&args[0], aggregation)
        .map_err(engine_err)?;
    Ok(Reply::ok())
}

fn cmd_ts_add(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 3, "TS.ADD")?;
    let timestamp = int_arg(&args[1], "timestamp")?;
    let value = float_arg(&args[2], "value")?;
    db.keyspace
        .write()
        .ts_add(&args[0], timestamp, value)
        .map_err(engine_err)?;
    Ok(Reply::ok())
}

/// `TS.RANGE key start end` lists raw points; the optional
/// `interval method` suffix downsamples them instead.
fn cmd_ts_range(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    if args.len() != 3 && args.len() != 5 {
        return Err(Reply::error(
            "TS.RANGE requires key, start, end, and optional interval + method",
        ));
    }
    let start = int_arg(&args[1], "start")?;
    let end = int_arg(&args[2], "end")?;

    let points = if args.len() == 5 {
        let interval = int_arg(&args[3], "interval")?;
        if interval <= 0 {
            return Err(Reply::error("interval must be a positive integer"));
        }
        let method: Aggregation = args[4].parse().map_err(engine_err)?;
        db.keyspace
            .write()
            .ts_downsample(&args[0], start, end, interval, method)
    } else {
        db.keyspace.write().ts_range(&args[0], start, end)
    }
    .map_err(engine_err)?;
    Ok(points_reply(points))
}

fn cmd_ts_get(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "TS.GET")?;
    let point = db.keyspace.write().ts_get(&args[0]).map_err(engine_err)?;
    Ok(Reply::Bulk(format!("{} {:.6}", point.timestamp, point.value)))
}

// -- vector commands -------------------------------------------------------

fn cmd_vector_set(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "VECTOR.SET")?;
    let mut vector = Vec::with_capacity(args.len() - 1);
    for raw in &args[1..] {
        vector.push(float_arg(raw, "vector value")?);
    }
    db.keyspace.write().vector_set(&args[0], vector);
    Ok(Reply::ok())
}

fn cmd_vector_get(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "VECTOR.GET")?;
    match db.keyspace.write().vector_get(&args[0]).map_err(engine_err)? {
        Some(vector) => {
            let body = serde_json::to_string(&vector).unwrap_or_default();
            Ok(Reply::Bulk(body))
        }
        None => Err(Reply::error("key not found")),
    }
}

fn cmd_vector_search(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "VECTOR.SEARCH")?;
    let k = uint_arg(&args[args.len() - 1], "k")?;
    if k == 0 {
        return Err(Reply::error("k must be a positive integer"));
    }
    let mut query = Vec::with_capacity(args.len() - 1);
    for raw in &args[..args.len() - 1] {
        query.push(float_arg(raw, "query vector value")?);
    }

    let hits = db.keyspace.read().vector_search(&query, k);
    let items = hits
        .into_iter()
        .map(|(key, distance)| format!("{key}: {distance:.6}"))
        .collect();
    Ok(Reply::Array(items))
}

// -- pub/sub commands ------------------------------------------------------

fn cmd_subscribe(db: &Arc<Db>, client: ClientId, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "SUBSCRIBE")?;
    let sink = db
        .sink_for(client)
        .ok_or_else(|| Reply::error("client cannot receive messages"))?;
    db.pubsub.subscribe(client, &args[0], sink);
    Ok(Reply::Simple(format!("SUBSCRIBED to {}", args[0])))
}

fn cmd_unsubscribe(db: &Arc<Db>, client: ClientId, args: &[String]) -> Result<Reply, Reply> {
    arity(args, 1, "UNSUBSCRIBE")?;
    db.pubsub.unsubscribe(client, &args[0]);
    Ok(Reply::Simple(format!("UNSUBSCRIBED from {}", args[0])))
}

fn cmd_publish(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    arity_min(args, 2, "PUBLISH")?;
    let message = args[1..].join(" ");
    let delivered = db.pubsub.publish(&args[0], &message);
    Ok(Reply::Integer(delivered as i64))
}

// -- persistence commands --------------------------------------------------

fn cmd_save(db: &Arc<Db>) -> Result<Reply, Reply> {
    db.save_snapshot()
        .map_err(|e| Reply::error(format!("failed to save snapshot: {e}")))?;
    Ok(Reply::Simple("OK Snapshot saved".into()))
}

fn cmd_restore(db: &Arc<Db>) -> Result<Reply, Reply> {
    db.load_snapshot()
        .map_err(|e| Reply::error(format!("failed to load snapshot: {e}")))?;
    Ok(Reply::Simple("OK Snapshot restored".into()))
}

fn cmd_bgsave(db: &Arc<Db>) -> Result<Reply, Reply> {
    let db = db.clone();
    if tokio::runtime::Handle::try_current().is_ok() {
        tokio::task::spawn_blocking(move || {
            if let Err(e) = db.save_snapshot() {
                error!("background snapshot failed: {e}");
            }
        });
    } else if let Err(e) = db.save_snapshot() {
        return Err(Reply::error(format!("failed to save snapshot: {e}")));
    }
    Ok(Reply::ok())
}

fn cmd_aof(db: &Arc<Db>, args: &[String]) -> Result<Reply, Reply> {
    match args.first() {
        Some(sub) if sub.eq_ignore_ascii_case("REWRITE") => {
            match db.rewrite_aof() {
                Ok(true) => Ok(Reply::Simple("OK AOF rewrite triggered".into())),
                Ok(false) => Err(Reply::error("append-only log is disabled")),
                Err(e) => Err(Reply::error(format!("AOF rewrite failed: {e}"))),
            }
        }
        Some(_) => Err(Reply::error("unknown AOF subcommand")),
        None => {
            if db.aof_enabled() {
                Ok(Reply::Simple("AOF is enabled".into()))
            } else {
                Ok(Reply::Simple("AOF is disabled".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::OutboxSink;
    use std::thread;
    use std::time::Duration;

    fn test_db() -> (Arc<Db>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(None, dir.path().join("snapshot.json")).unwrap();
        (db, dir)
    }

    fn run(db: &Arc<Db>, line: &str) -> String {
        dispatch(db, 7, line)
    }

    // -- strings and TTL ---------------------------------------------------

    #[test]
    fn set_get_with_ttl() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "SET foo bar EX 1"), "+OK");
        assert_eq!(run(&db, "GET foo"), "$3\r\nbar");

        let ttl = run(&db, "TTL foo");
        assert!(ttl == ":0" || ttl == ":1", "got {ttl}");
    }

    #[test]
    fn get_after_expiry_is_nil() {
        let (db, _dir) = test_db();
        db.keyspace
            .write()
            .set("foo", "bar".into(), Some(Duration::from_millis(15)));
        assert_eq!(run(&db, "GET foo"), "$3\r\nbar");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(run(&db, "GET foo"), "$-1");
        assert_eq!(run(&db, "TTL foo"), ":-2");
    }

    #[test]
    fn ttl_persist_and_ex() {
        let (db, _dir) = test_db();
        run(&db, "SET k v");
        assert_eq!(run(&db, "TTL k"), ":-1");
        assert_eq!(run(&db, "EX k 100"), "+OK");
        let ttl: i64 = run(&db, "TTL k")[1..].parse().unwrap();
        assert!((98..=100).contains(&ttl));
        assert_eq!(run(&db, "PERSIST k"), ":1");
        assert_eq!(run(&db, "TTL k"), ":-1");
        assert_eq!(run(&db, "PERSIST k"), ":0");
        assert_eq!(run(&db, "TTL ghost"), ":-2");
    }

    #[test]
    fn del_exists_and_keys() {
        let (db, _dir) = test_db();
        run(&db, "SET user:1 a");
        run(&db, "SET user:2 b");
        run(&db, "SET other c");

        assert_eq!(run(&db, "EXISTS user:1"), ":1");
        assert_eq!(run(&db, "DEL user:1"), ":1");
        assert_eq!(run(&db, "DEL user:1"), ":0");
        assert_eq!(run(&db, "EXISTS user:1"), ":0");
        assert_eq!(run(&db, "KEYS user:*"), "*1\r\n$6\r\nuser:2\r\n");
    }

    #[test]
    fn incr_decr_laws() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "INCR n"), ":1");
        assert_eq!(run(&db, "INCRBY n 10"), ":11");
        assert_eq!(run(&db, "DECRBY n 10"), ":1");
        assert_eq!(run(&db, "DECR n"), ":0");
        run(&db, "SET s abc");
        assert_eq!(
            run(&db, "INCR s"),
            "-ERR value is not an integer or out of range"
        );
    }

    #[test]
    fn append_strlen_ranges() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "APPEND k hello"), ":5");
        assert_eq!(run(&db, "STRLEN k"), ":5");
        assert_eq!(run(&db, "GETRANGE k 1 3"), "$3\r\nell");
        assert_eq!(run(&db, "SETRANGE k 5 world"), ":10");
        assert_eq!(run(&db, "GET k"), "$10\r\nhelloworld");
    }

    #[test]
    fn quoted_arguments_survive_tokenization() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "SET greeting \"hello world\""), "+OK");
        assert_eq!(run(&db, "GET greeting"), "$11\r\nhello world");
    }

    // -- wrong type and argument errors ------------------------------------

    #[test]
    fn wrongtype_surfaces_as_err() {
        let (db, _dir) = test_db();
        run(&db, "LPUSH l a");
        assert_eq!(
            run(&db, "GET l"),
            "-ERR WRONGTYPE Operation against a key holding the wrong kind of value"
        );
        assert!(run(&db, "INCR l").starts_with("-ERR "));
        assert!(run(&db, "SADD l m").starts_with("-ERR WRONGTYPE"));
    }

    #[test]
    fn unknown_command_and_arity_errors() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "FLY away"), "-ERR unknown command 'FLY'");
        assert_eq!(run(&db, "GET"), "-ERR wrong number of arguments for 'GET'");
        assert_eq!(run(&db, "ZADD z notafloat m"), "-ERR score must be a float");
        assert_eq!(run(&db, ""), "-ERR empty command");
    }

    // -- lists, hashes, sets -----------------------------------------------

    #[test]
    fn list_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "RPUSH l b c"), ":2");
        assert_eq!(run(&db, "LPUSH l a"), ":3");
        assert_eq!(run(&db, "LLEN l"), ":3");
        assert_eq!(run(&db, "LRANGE l 0 -1"), "*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n");
        assert_eq!(run(&db, "LPOP l"), "$1\r\na");
        assert_eq!(run(&db, "RPOP l"), "$1\r\nc");
        assert_eq!(run(&db, "LPOP ghost"), "$-1");
    }

    #[test]
    fn hash_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "HSET h f v"), ":1");
        assert_eq!(run(&db, "HSET h f v2"), ":0");
        assert_eq!(run(&db, "HGET h f"), "$2\r\nv2");
        assert_eq!(run(&db, "HMSET h a 1 b 2"), "+OK");
        assert_eq!(
            run(&db, "HGETALL h"),
            "*6\r\n$1\r\na\r\n$1\r\n1\r\n$1\r\nb\r\n$1\r\n2\r\n$1\r\nf\r\n$2\r\nv2\r\n"
        );
        assert_eq!(run(&db, "HEXISTS h a"), ":1");
        assert_eq!(run(&db, "HDEL h a"), ":1");
        assert_eq!(run(&db, "HEXISTS h a"), ":0");
        assert_eq!(run(&db, "HGETALL ghost"), "$-1");
    }

    #[test]
    fn set_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "SADD s a b c"), ":3");
        assert_eq!(run(&db, "SADD s b"), ":0");
        assert_eq!(run(&db, "SISMEMBER s b"), ":1");
        assert_eq!(run(&db, "SREM s b"), ":1");
        assert_eq!(run(&db, "SISMEMBER s b"), ":0");
        assert_eq!(run(&db, "SMEMBERS s"), "*2\r\n$1\r\na\r\n$1\r\nc\r\n");

        run(&db, "SADD t c d");
        assert_eq!(run(&db, "SUNION s t"), "*3\r\n$1\r\na\r\n$1\r\nc\r\n$1\r\nd\r\n");
        assert_eq!(run(&db, "SINTER s t"), "*1\r\n$1\r\nc\r\n");
        assert_eq!(run(&db, "SDIFF s t"), "*1\r\n$1\r\na\r\n");
    }

    // -- sorted sets (S2) ---------------------------------------------------

    #[test]
    fn sorted_set_scenario() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "ZADD z 1 a"), ":1");
        assert_eq!(run(&db, "ZADD z 2 b"), ":1");
        assert_eq!(run(&db, "ZADD z 3 c"), ":1");
        assert_eq!(run(&db, "ZRANGE z 0 2"), "*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n");
        assert_eq!(run(&db, "ZRANK z b"), ":1");
        assert_eq!(run(&db, "ZREM z b"), ":1");
        assert_eq!(run(&db, "ZRANGE z 0 2"), "*2\r\n$1\r\na\r\n$1\r\nc\r\n");
        assert_eq!(run(&db, "ZRANK z ghost"), "$-1");
        assert_eq!(run(&db, "ZRANGEBYSCORE z 1 3"), "*2\r\n$1\r\na\r\n$1\r\nc\r\n");
    }

    // -- bitmaps (S3) and bitfields -----------------------------------------

    #[test]
    fn bitmap_scenario() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "SETBIT bm 5 1"), ":0");
        assert_eq!(run(&db, "SETBIT bm 5 0"), ":1");
        run(&db, "SETBIT bm 1 1");
        run(&db, "SETBIT bm 3 1");
        run(&db, "SETBIT bm 5 1");
        assert_eq!(run(&db, "BITCOUNT bm"), ":3");
        assert_eq!(run(&db, "GETBIT bm 3"), ":1");
        assert_eq!(run(&db, "GETBIT bm 999"), ":0");
    }

    #[test]
    fn bitop_not_twice_restores() {
        let (db, _dir) = test_db();
        run(&db, "SETBIT a 1 1");
        run(&db, "SETBIT a 6 1");
        assert_eq!(run(&db, "BITOP NOT n1 a"), ":1");
        assert_eq!(run(&db, "BITOP NOT n2 n1"), ":1");
        assert_eq!(run(&db, "BITCOUNT n2"), ":2");
        assert_eq!(run(&db, "GETBIT n2 1"), ":1");
        assert_eq!(run(&db, "GETBIT n2 6"), ":1");
        assert_eq!(run(&db, "BITOP NOT bad a b"), "-ERR BITOP NOT must be called with a single source key");
    }

    #[test]
    fn bitfield_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "BITFIELD bf SET u8 0 200"), ":0");
        assert_eq!(run(&db, "BITFIELD bf GET u8 0"), ":200");
        assert_eq!(run(&db, "BITFIELD bf INCRBY u8 0 60"), ":4");
        assert_eq!(run(&db, "BITFIELD bf SET i8 8 -5"), ":0");
        assert_eq!(run(&db, "BITFIELD bf GET i8 8"), ":-5");
        assert!(run(&db, "BITFIELD bf SET u8 0 300").starts_with("-ERR "));
        assert!(run(&db, "BITFIELD bf WIBBLE u8 0").starts_with("-ERR "));
    }

    // -- streams (S4) --------------------------------------------------------

    #[test]
    fn stream_group_scenario() {
        let (db, _dir) = test_db();
        let reply = run(&db, "XADD s * f1 v1");
        assert!(reply.starts_with('+'), "got {reply}");
        let id = reply[1..].to_string();

        assert_eq!(run(&db, "XLEN s"), ":1");
        assert_eq!(run(&db, "XGROUP CREATE s g"), "+OK");

        let read = run(&db, "XREADGROUP s g c1 0 10");
        assert!(read.starts_with("*1\r\n"), "got {read}");
        assert!(read.contains("f1 v1"), "got {read}");

        assert_eq!(run(&db, &format!("XACK s g {id}")), ":1");
        assert_eq!(run(&db, &format!("XACK s g {id}")), ":0");
    }

    #[test]
    fn stream_ranges_and_reads() {
        let (db, _dir) = test_db();
        run(&db, "XADD s 1-0 a 1");
        run(&db, "XADD s 2-0 b 2");
        run(&db, "XADD s 3-0 c 3");

        assert_eq!(run(&db, "XRANGE s 1-0 2-0"), "*2\r\n$7\r\n1-0 a 1\r\n$7\r\n2-0 b 2\r\n");
        assert_eq!(run(&db, "XREAD s 1-0"), "*2\r\n$7\r\n2-0 b 2\r\n$7\r\n3-0 c 3\r\n");
        assert_eq!(run(&db, "XREAD s 1-0 1"), "*1\r\n$7\r\n2-0 b 2\r\n");
        assert!(run(&db, "XADD s 2-0 d 4").starts_with("-ERR "));
    }

    // -- transactions (S5) ---------------------------------------------------

    #[test]
    fn transaction_scenario() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "MULTI"), "+OK");
        assert_eq!(run(&db, "SET a 1"), "+QUEUED");
        assert_eq!(run(&db, "SET b 2"), "+QUEUED");
        assert_eq!(run(&db, "EXEC"), "+OK\r\n+OK");
        assert_eq!(run(&db, "GET a"), "$1\r\n1");
        assert_eq!(run(&db, "GET b"), "$1\r\n2");
    }

    #[test]
    fn discard_drops_queued_commands() {
        let (db, _dir) = test_db();
        run(&db, "MULTI");
        assert_eq!(run(&db, "SET a 1"), "+QUEUED");
        assert_eq!(run(&db, "DISCARD"), "+OK");
        assert_eq!(run(&db, "GET a"), "$-1");
        assert_eq!(run(&db, "EXEC"), "-ERR no transaction started");
        assert_eq!(run(&db, "DISCARD"), "-ERR no transaction started");
    }

    #[test]
    fn transactions_are_per_client() {
        let (db, _dir) = test_db();
        assert_eq!(dispatch(&db, 1, "MULTI"), "+OK");
        assert_eq!(dispatch(&db, 1, "SET a 1"), "+QUEUED");

        // client 2 is unaffected by client 1's MULTI state
        assert_eq!(dispatch(&db, 2, "SET b 2"), "+OK");
        assert_eq!(dispatch(&db, 2, "GET b"), "$1\r\n2");
        assert_eq!(dispatch(&db, 2, "GET a"), "$-1");

        assert_eq!(dispatch(&db, 1, "EXEC"), "+OK");
        assert_eq!(dispatch(&db, 2, "GET a"), "$1\r\n1");
    }

    #[test]
    fn exec_replies_match_queue_order() {
        let (db, _dir) = test_db();
        run(&db, "MULTI");
        run(&db, "SET n 5");
        run(&db, "INCR n");
        run(&db, "GET n");
        assert_eq!(run(&db, "EXEC"), "+OK\r\n:6\r\n$1\r\n6");
    }

    // -- pub/sub (S6) --------------------------------------------------------

    #[tokio::test]
    async fn pubsub_scenario() {
        let (db, _dir) = test_db();
        let outbox = OutboxSink::new();
        let c1 = db.register_client(outbox.clone());

        assert_eq!(dispatch(&db, c1, "SUBSCRIBE ch"), "+SUBSCRIBED to ch");
        assert_eq!(dispatch(&db, 99, "PUBLISH ch hi"), ":1");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(outbox.messages(), vec!["hi"]);

        assert_eq!(dispatch(&db, c1, "UNSUBSCRIBE ch"), "+UNSUBSCRIBED from ch");
        assert_eq!(dispatch(&db, 99, "PUBLISH ch bye"), ":0");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(outbox.messages(), vec!["hi"]);
    }

    #[tokio::test]
    async fn publish_joins_message_tokens() {
        let (db, _dir) = test_db();
        let outbox = OutboxSink::new();
        let c1 = db.register_client(outbox.clone());
        dispatch(&db, c1, "SUBSCRIBE news");
        assert_eq!(dispatch(&db, 99, "PUBLISH news breaking story"), ":1");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(outbox.messages(), vec!["breaking story"]);
    }

    #[test]
    fn subscribe_without_sink_fails() {
        let (db, _dir) = test_db();
        assert_eq!(
            run(&db, "SUBSCRIBE ch"),
            "-ERR client cannot receive messages"
        );
    }

    // -- JSON ----------------------------------------------------------------

    #[test]
    fn json_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, r#"JSON.SET doc . {"a":1,"items":[1]}"#), "+OK");
        assert_eq!(run(&db, "JSON.GET doc .a"), "$1\r\n1");
        assert_eq!(run(&db, "JSON.ARRAPPEND doc .items 2"), ":2");
        assert_eq!(run(&db, "JSON.GET doc .items"), "$5\r\n[1,2]");
        assert_eq!(run(&db, "JSON.DEL doc .a"), ":1");
        assert!(run(&db, "JSON.GET doc .a").starts_with("-ERR "));

        // deleting the root removes the key entirely
        assert_eq!(run(&db, "JSON.DEL doc ."), ":1");
        assert_eq!(run(&db, "EXISTS doc"), ":0");
    }

    // -- geo -----------------------------------------------------------------

    #[test]
    fn geo_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "GEOADD cities 2.3522 48.8566 paris"), ":1");
        assert_eq!(run(&db, "GEOADD cities -0.1276 51.5072 london"), ":1");

        let reply = run(&db, "GEODIST cities paris london");
        let km: f64 = reply
            .split("\r\n")
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("bulk float");
        assert!((km - 344.0).abs() < 5.0, "distance {km}");

        assert_eq!(
            run(&db, "GEORADIUS cities 2.3522 48.8566 500"),
            "*2\r\n$6\r\nlondon\r\n$5\r\nparis\r\n"
        );
        assert!(run(&db, "GEODIST cities paris ghost").starts_with("-ERR "));
    }

    // -- HyperLogLog ---------------------------------------------------------

    #[test]
    fn hyperloglog_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "PFADD visitors alice bob"), ":1");
        assert_eq!(run(&db, "PFADD visitors alice"), ":0");
        assert_eq!(run(&db, "PFCOUNT visitors"), ":2");

        run(&db, "PFADD other carol");
        assert_eq!(run(&db, "PFMERGE visitors other"), "+OK");
        assert_eq!(run(&db, "PFCOUNT visitors"), ":3");
        assert!(run(&db, "PFCOUNT ghost").starts_with("-ERR "));
    }

    // -- time series ---------------------------------------------------------

    #[test]
    fn time_series_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "TS.CREATE temps avg"), "+OK");
        assert!(run(&db, "TS.CREATE temps avg").starts_with("-ERR "));
        assert!(run(&db, "TS.CREATE bad median").starts_with("-ERR "));

        run(&db, "TS.ADD temps 11 2.0");
        run(&db, "TS.ADD temps 14 4.0");
        run(&db, "TS.ADD temps 21 6.0");

        assert_eq!(run(&db, "TS.GET temps"), "$11\r\n21 6.000000");
        // exclusive window drops both endpoints
        assert_eq!(run(&db, "TS.RANGE temps 11 21"), "*1\r\n$11\r\n14 4.000000\r\n");
        // downsampled form: one bucket per 10s window
        assert_eq!(
            run(&db, "TS.RANGE temps 0 100 10 avg"),
            "*2\r\n$11\r\n10 3.000000\r\n$11\r\n20 6.000000\r\n"
        );
        assert!(run(&db, "TS.ADD ghost 1 1.0").starts_with("-ERR "));
    }

    // -- vectors -------------------------------------------------------------

    #[test]
    fn vector_commands() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "VECTOR.SET a 1.0 0.0"), "+OK");
        assert_eq!(run(&db, "VECTOR.SET b 0.0 1.0"), "+OK");
        assert_eq!(run(&db, "VECTOR.GET a"), "$9\r\n[1.0,0.0]");

        let reply = run(&db, "VECTOR.SEARCH 1.0 0.0 1");
        assert!(reply.starts_with("*1\r\n"), "got {reply}");
        assert!(reply.contains("a: 0.000000"), "got {reply}");
        assert!(run(&db, "VECTOR.GET ghost").starts_with("-ERR "));
    }

    // -- persistence ---------------------------------------------------------

    #[test]
    fn save_and_restore_round_trip() {
        let (db, _dir) = test_db();
        run(&db, "SET k before");
        assert_eq!(run(&db, "SAVE"), "+OK Snapshot saved");
        run(&db, "SET k after");
        assert_eq!(run(&db, "RESTORE"), "+OK Snapshot restored");
        assert_eq!(run(&db, "GET k"), "$6\r\nbefore");
    }

    #[test]
    fn aof_replay_rebuilds_state() {
        let dir = tempfile::tempdir().unwrap();
        let aof_path = dir.path().join("appendonly.aof");
        {
            let db =
                Db::open(Some(aof_path.clone()), dir.path().join("snap.json")).unwrap();
            run(&db, "SET a 1");
            run(&db, "RPUSH l x y");
            run(&db, "ZADD z 1.5 m");
            run(&db, "DEL a");
            run(&db, "SET b 2");
            db.close();
        }

        let db = Db::open(Some(aof_path), dir.path().join("snap.json")).unwrap();
        assert_eq!(run(&db, "GET a"), "$-1");
        assert_eq!(run(&db, "GET b"), "$1\r\n2");
        assert_eq!(run(&db, "LRANGE l 0 -1"), "*2\r\n$1\r\nx\r\n$1\r\ny\r\n");
        assert_eq!(run(&db, "ZRANGE z 0 -1"), "*1\r\n$1\r\nm\r\n");
    }

    #[test]
    fn aof_skips_reads_and_control_commands() {
        let dir = tempfile::tempdir().unwrap();
        let aof_path = dir.path().join("appendonly.aof");
        let db = Db::open(Some(aof_path.clone()), dir.path().join("snap.json")).unwrap();

        run(&db, "SET a 1");
        run(&db, "GET a");
        run(&db, "KEYS *");
        run(&db, "MULTI");
        run(&db, "SET b 2");
        run(&db, "EXEC");
        db.close();

        let lines = cinder_persistence::aof::read_commands(&aof_path).unwrap();
        assert_eq!(lines, vec!["SET a 1", "SET b 2"]);
    }

    #[test]
    fn aof_rewrite_compacts_log() {
        let dir = tempfile::tempdir().unwrap();
        let aof_path = dir.path().join("appendonly.aof");
        let db = Db::open(Some(aof_path.clone()), dir.path().join("snap.json")).unwrap();

        for i in 0..20 {
            run(&db, &format!("SET k v{i}"));
        }
        run(&db, "SET other x EX 500");
        assert_eq!(run(&db, "AOF REWRITE"), "+OK AOF rewrite triggered");
        run(&db, "SET post 1");
        db.close();

        let lines = cinder_persistence::aof::read_commands(&aof_path).unwrap();
        assert!(lines.len() <= 4, "log not compacted: {lines:?}");
        assert!(lines.contains(&"SET k v19".to_owned()));
        assert!(lines.iter().any(|l| l.starts_with("EX other ")));
        assert!(lines.contains(&"SET post 1".to_owned()));
    }

    #[test]
    fn aof_status_reports_mode() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "AOF"), "+AOF is disabled");
        assert_eq!(run(&db, "AOF REWRITE"), "-ERR append-only log is disabled");

        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(
            Some(dir.path().join("a.aof")),
            dir.path().join("snap.json"),
        )
        .unwrap();
        assert_eq!(run(&db, "AOF"), "+AOF is enabled");
    }

    #[test]
    fn quit_replies_ok() {
        let (db, _dir) = test_db();
        assert_eq!(run(&db, "QUIT"), "+OK");
    }
}
